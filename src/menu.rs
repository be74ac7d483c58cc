// 🍽️ Menu Model - Meal types, canonical sections, payloads and snapshots
// Everything downstream (fingerprints, formatting, ledger) speaks these types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// MEAL TYPE
// ============================================================================

/// MealType - the unit of change tracking and message lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Lunch,
    Dinner,
}

impl MealType {
    pub const ALL: [MealType; 2] = [MealType::Lunch, MealType::Dinner];

    /// Stable key used by the persistent stores
    pub fn as_key(&self) -> &'static str {
        match self {
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
        }
    }

    /// Label as printed by the cafeteria site and in channel messages
    pub fn label(&self) -> &'static str {
        match self {
            MealType::Lunch => "Almoço",
            MealType::Dinner => "Jantar",
        }
    }

    /// Cutover rule: before `cutover_hour` is lunch, at or after is dinner
    pub fn for_hour(hour: u32, cutover_hour: u32) -> Self {
        if hour < cutover_hour {
            MealType::Lunch
        } else {
            MealType::Dinner
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl FromStr for MealType {
    type Err = String;

    /// Accepts the storage key or the Portuguese label (older ledger files
    /// were written with labels)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lunch" | "almoço" | "almoco" => Ok(MealType::Lunch),
            "dinner" | "jantar" => Ok(MealType::Dinner),
            other => Err(format!("unknown meal type: {}", other)),
        }
    }
}

// ============================================================================
// SECTION
// ============================================================================

/// Section - fixed set of menu sections, declared in canonical output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    Side,
    Salad,
    Main,
    Accompaniment,
    Dessert,
    Drink,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Side,
        Section::Salad,
        Section::Main,
        Section::Accompaniment,
        Section::Dessert,
        Section::Drink,
    ];

    /// Canonical (English) name, also accepted as a structured payload key
    pub fn name(&self) -> &'static str {
        match self {
            Section::Side => "Side",
            Section::Salad => "Salad",
            Section::Main => "Main",
            Section::Accompaniment => "Accompaniment",
            Section::Dessert => "Dessert",
            Section::Drink => "Drink",
        }
    }

    /// Label shown in the channel message
    pub fn label(&self) -> &'static str {
        self.headers()[0]
    }

    /// Header lines as they appear in the scraped page
    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            Section::Side => &["Acompanhamento"],
            Section::Salad => &["Salada"],
            Section::Main => &["Prato Principal"],
            Section::Accompaniment => &["Guarnição"],
            Section::Dessert => &["Sobremesa"],
            Section::Drink => &["Suco", "Bebida"],
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Section::Side => "🍟",
            Section::Salad => "🥗",
            Section::Main => "🍛",
            Section::Accompaniment => "🍚",
            Section::Dessert => "🍨",
            Section::Drink => "🥤",
        }
    }

    /// Exact header match, used for raw scraped lines
    pub fn from_header(line: &str) -> Option<Section> {
        Section::ALL
            .into_iter()
            .find(|section| section.headers().iter().any(|h| *h == line))
    }

    /// Case-insensitive match on the English name or any header, used for
    /// structured payload keys
    pub fn from_key(key: &str) -> Option<Section> {
        let key = key.trim().to_lowercase();
        Section::ALL.into_iter().find(|section| {
            section.name().to_lowercase() == key
                || section.headers().iter().any(|h| h.to_lowercase() == key)
        })
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// PAYLOAD (input to the normalizer)
// ============================================================================

/// Items for one section in a structured payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemList {
    /// "Chicken/Rice" style, split on `/` then on commas
    Text(String),
    List(Vec<String>),
}

/// MenuPayload - what a menu source hands to the normalizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuPayload {
    /// Line-delimited text scraped from the page
    Raw(String),

    /// Section name → items, e.g. from an extraction service.
    /// `source` carries the raw text the mapping was extracted from, if any.
    Structured {
        sections: BTreeMap<String, ItemList>,
        source: Option<String>,
    },
}

impl MenuPayload {
    /// Build a payload from a JSON document.
    ///
    /// A top-level key naming `meal` (`"lunch"`, `"Almoço"`, ...) selects a
    /// nested object or string; otherwise the object itself is the mapping.
    /// A `"source"` string is taken as the raw-text fallback. Returns `None`
    /// when the value is not an object.
    pub fn from_json(value: &serde_json::Value, meal: MealType) -> Option<MenuPayload> {
        let object = value.as_object()?;

        let nested = object
            .iter()
            .find(|(key, _)| key.parse::<MealType>().ok() == Some(meal))
            .map(|(_, v)| v);

        let object = match nested {
            Some(serde_json::Value::String(text)) => return Some(MenuPayload::Raw(text.clone())),
            Some(serde_json::Value::Object(inner)) => inner,
            Some(_) => return None,
            None => object,
        };

        let mut sections = BTreeMap::new();
        let mut source = None;

        for (key, value) in object {
            if key.eq_ignore_ascii_case("source") {
                source = value.as_str().map(str::to_string);
                continue;
            }
            // Keys belonging to the other meal are not sections
            if key.parse::<MealType>().is_ok() {
                continue;
            }
            match value {
                serde_json::Value::String(text) => {
                    sections.insert(key.clone(), ItemList::Text(text.clone()));
                }
                serde_json::Value::Array(entries) => {
                    let items = entries
                        .iter()
                        .filter_map(|e| e.as_str().map(str::to_string))
                        .collect();
                    sections.insert(key.clone(), ItemList::List(items));
                }
                _ => {}
            }
        }

        Some(MenuPayload::Structured { sections, source })
    }
}

// ============================================================================
// SNAPSHOT (output of the normalizer)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSection {
    pub section: Section,
    pub items: Vec<String>,
}

/// MenuSnapshot - canonical, immutable view of one meal's menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSnapshot {
    /// Non-empty sections in canonical order
    pub sections: Vec<MenuSection>,

    /// Cleaned raw lines, kept only when no section could be recognized
    pub fallback: Option<Vec<String>>,

    /// True when the Side section is the fixed default rather than content
    pub default_side: bool,

    /// Day the menu is served on; part of the fingerprint when present
    pub service_date: Option<NaiveDate>,
}

impl MenuSnapshot {
    pub fn section(&self, section: Section) -> Option<&MenuSection> {
        self.sections.iter().find(|s| s.section == section)
    }

    pub fn items(&self, section: Section) -> Option<&[String]> {
        self.section(section).map(|s| s.items.as_slice())
    }

    /// Whether there is anything worth sending. The injected default side
    /// does not count.
    pub fn has_content(&self) -> bool {
        let content_sections = self
            .sections
            .iter()
            .filter(|s| !(self.default_side && s.section == Section::Side))
            .count();
        content_sections > 0 || self.fallback.as_ref().is_some_and(|lines| !lines.is_empty())
    }

    pub fn with_service_date(mut self, date: NaiveDate) -> Self {
        self.service_date = Some(date);
        self
    }

    /// Stable textual form used for fingerprinting.
    ///
    /// Only section names, item text and their order take part; labels,
    /// emoji and markup never do.
    pub fn canonical_text(&self) -> String {
        let mut out = String::new();

        if let Some(date) = self.service_date {
            out.push_str(&format!("@{}\n", date));
        }

        if self.sections.iter().any(|s| !(self.default_side && s.section == Section::Side)) {
            for section in &self.sections {
                out.push_str(section.section.name());
                for item in &section.items {
                    out.push('\u{1f}');
                    out.push_str(item);
                }
                out.push('\n');
            }
        } else if let Some(lines) = &self.fallback {
            out.push_str("#raw\n");
            for line in lines {
                out.push_str(line);
                out.push('\n');
            }
        }

        out
    }
}
