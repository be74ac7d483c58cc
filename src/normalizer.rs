// 🧹 Content Normalizer - raw or structured payload → canonical MenuSnapshot
// Pure functions: no network, no storage

use crate::menu::{ItemList, MenuPayload, MenuSection, MenuSnapshot, Section};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

// ============================================================================
// RULES
// ============================================================================

/// Boilerplate phrases dropped from scraped text (case-insensitive substring)
pub const DEFAULT_BLOCKLIST: [&str; 4] = ["sujeito", "informamos", "opção", "cardápio"];

/// Side dishes served every day regardless of what the page says
pub const DEFAULT_SIDE: [&str; 3] = ["Arroz Branco", "Arroz Integral", "Feijão"];

#[derive(Debug, Clone)]
pub struct NormalizeRules {
    /// Lines containing any of these (case-insensitive) are skipped
    pub blocklist: Vec<String>,

    /// Injected under Side when the payload has no Side section
    pub default_side: Vec<String>,
}

impl NormalizeRules {
    pub fn with_blocklist(mut self, blocklist: Vec<String>) -> Self {
        self.blocklist = blocklist;
        self
    }

    fn is_blocked(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.blocklist
            .iter()
            .any(|phrase| !phrase.is_empty() && lower.contains(&phrase.to_lowercase()))
    }
}

impl Default for NormalizeRules {
    fn default() -> Self {
        NormalizeRules {
            blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            default_side: DEFAULT_SIDE.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ============================================================================
// SECTION ACCUMULATOR
// ============================================================================

#[derive(Default)]
struct SectionItems {
    items: Vec<String>,
    seen: HashSet<String>,
}

/// Collects items per section, deduplicating case-insensitively.
/// BTreeMap keyed by Section keeps the canonical order for free.
#[derive(Default)]
struct Accumulator {
    sections: BTreeMap<Section, SectionItems>,
}

impl Accumulator {
    /// Split a comma-joined entry and add each piece to `section`
    fn push_joined(&mut self, section: Section, entry: &str) {
        for piece in entry.split(',') {
            self.push_item(section, piece);
        }
    }

    fn push_item(&mut self, section: Section, item: &str) {
        let item = item.trim();
        if item.chars().count() <= 1 {
            return;
        }

        let slot = self.sections.entry(section).or_default();
        if slot.seen.insert(item.to_lowercase()) {
            slot.items.push(item.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.sections.values().all(|s| s.items.is_empty())
    }

    fn into_snapshot(self, rules: &NormalizeRules, fallback: Option<Vec<String>>) -> MenuSnapshot {
        let mut sections: Vec<MenuSection> = self
            .sections
            .into_iter()
            .filter(|(_, slot)| !slot.items.is_empty())
            .map(|(section, slot)| MenuSection { section, items: slot.items })
            .collect();

        let default_side = !sections.iter().any(|s| s.section == Section::Side)
            && !rules.default_side.is_empty();
        if default_side {
            // Side is first in canonical order
            sections.insert(
                0,
                MenuSection {
                    section: Section::Side,
                    items: rules.default_side.clone(),
                },
            );
        }

        MenuSnapshot {
            sections,
            fallback,
            default_side,
            service_date: None,
        }
    }
}

// ============================================================================
// NORMALIZE
// ============================================================================

/// Turn a payload into a canonical snapshot.
///
/// A structured payload whose mapping yields no items falls back to its
/// `source` text, normalized exactly like a raw payload. With neither, the
/// snapshot has no content and callers treat it as "no usable content".
pub fn normalize(payload: &MenuPayload, rules: &NormalizeRules) -> MenuSnapshot {
    match payload {
        MenuPayload::Raw(text) => normalize_raw(text, rules),
        MenuPayload::Structured { sections, source } => {
            let acc = accumulate_structured(sections);
            if acc.is_empty() {
                if let Some(text) = source {
                    debug!("Structured payload has no items, falling back to source text");
                    return normalize_raw(text, rules);
                }
            }
            acc.into_snapshot(rules, None)
        }
    }
}

fn normalize_raw(text: &str, rules: &NormalizeRules) -> MenuSnapshot {
    let mut acc = Accumulator::default();
    let mut current: Option<Section> = None;
    let mut cleaned = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || rules.is_blocked(line) {
            continue;
        }

        let line = strip_parenthetical(line);
        if line.is_empty() {
            continue;
        }

        if let Some(section) = Section::from_header(line) {
            current = Some(section);
            continue;
        }

        cleaned.push(line.to_string());

        // Lines before the first header are page chrome
        if let Some(section) = current {
            acc.push_joined(section, line);
        }
    }

    let fallback = if acc.is_empty() && !cleaned.is_empty() {
        Some(cleaned)
    } else {
        None
    };

    acc.into_snapshot(rules, fallback)
}

fn accumulate_structured(sections: &BTreeMap<String, ItemList>) -> Accumulator {
    let mut acc = Accumulator::default();

    for (key, list) in sections {
        let Some(section) = Section::from_key(key) else {
            debug!(key = %key, "Ignoring unrecognized section");
            continue;
        };

        match list {
            ItemList::Text(text) => {
                for part in text.split('/') {
                    acc.push_joined(section, part);
                }
            }
            ItemList::List(items) => {
                for item in items {
                    acc.push_joined(section, item);
                }
            }
        }
    }

    acc
}

/// "Feijoada (contém carne suína)" → "Feijoada"
fn strip_parenthetical(line: &str) -> &str {
    match line.find('(') {
        Some(idx) => line[..idx].trim(),
        None => line,
    }
}
