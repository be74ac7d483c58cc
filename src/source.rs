// 🌐 Menu Sources - where today's menu comes from
// The cafeteria site (scraped) or a local file (previews, testing, offline runs)

use crate::menu::{MealType, MenuPayload};
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::debug;

/// Menu pages live under `<url>/<YYYY-MM-DD>`
pub const DEFAULT_MENU_URL: &str = "https://ru.ufes.br/cardapio";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// MenuSource - fetch today's menu for one meal.
///
/// `Ok(None)` means the source answered but has nothing for that meal.
pub trait MenuSource {
    fn fetch_today(&self, meal: MealType, date: NaiveDate) -> Result<Option<MenuPayload>, SourceError>;
}

// ============================================================================
// FILE SOURCE
// ============================================================================

/// Reads a local file on every fetch: a JSON document (structured payload,
/// see `MenuPayload::from_json`) or plain scraped text.
#[derive(Debug, Clone)]
pub struct FileMenuSource {
    path: PathBuf,
}

impl FileMenuSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileMenuSource { path: path.into() }
    }
}

impl MenuSource for FileMenuSource {
    fn fetch_today(&self, meal: MealType, _date: NaiveDate) -> Result<Option<MenuPayload>, SourceError> {
        let text = std::fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        if text.trim_start().starts_with('{') {
            let value: serde_json::Value =
                serde_json::from_str(&text).map_err(|e| SourceError::Parse(e.to_string()))?;
            debug!(path = %self.path.display(), "Loaded structured menu file");
            return Ok(MenuPayload::from_json(&value, meal));
        }

        Ok(Some(MenuPayload::Raw(text)))
    }
}

// ============================================================================
// CAFETERIA SITE
// ============================================================================

#[cfg(feature = "http")]
pub use ufes::{extract_meals, UfesMenuSource};

#[cfg(feature = "http")]
mod ufes {
    use super::{MenuSource, SourceError};
    use crate::menu::{MealType, MenuPayload};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::time::Duration;
    use tracing::{debug, info};

    /// Scrapes `<base_url>/<YYYY-MM-DD>`
    pub struct UfesMenuSource {
        http: reqwest::blocking::Client,
        base_url: String,
    }

    impl UfesMenuSource {
        pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
            let http = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(20))
                .user_agent("Mozilla/5.0")
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

            Ok(UfesMenuSource {
                http,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            })
        }
    }

    impl MenuSource for UfesMenuSource {
        fn fetch_today(&self, meal: MealType, date: NaiveDate) -> Result<Option<MenuPayload>, SourceError> {
            let url = format!("{}/{}", self.base_url, date.format("%Y-%m-%d"));
            info!(url = %url, "Fetching menu page");

            let response = self
                .http
                .get(&url)
                .send()
                .map_err(|e| SourceError::Network(e.to_string()))?;

            if !response.status().is_success() {
                return Err(SourceError::Status(response.status().as_u16()));
            }

            let html = response
                .text()
                .map_err(|e| SourceError::Network(e.to_string()))?;

            let mut meals = extract_meals(&html)?;
            debug!(found = meals.len(), "Extracted meals from page");
            Ok(meals.remove(&meal).map(MenuPayload::Raw))
        }
    }

    /// Pair each `views-field-title` with its `views-field-body` and keep the
    /// ones titled "Almoço" or "Jantar". Body text is joined line by line.
    pub fn extract_meals(html: &str) -> Result<HashMap<MealType, String>, SourceError> {
        use scraper::{Html, Selector};

        let parse = |s: &str| Selector::parse(s).map_err(|e| SourceError::Parse(e.to_string()));
        let title_selector = parse("div.views-field-title span.field-content")?;
        let body_selector = parse("div.views-field-body div.field-content")?;

        let document = Html::parse_document(html);
        let titles = document.select(&title_selector);
        let bodies = document.select(&body_selector);

        let mut meals = HashMap::new();
        for (title, body) in titles.zip(bodies) {
            let title: String = title.text().collect::<String>().trim().to_string();

            let meal = if title.contains("Almoço") {
                MealType::Lunch
            } else if title.contains("Jantar") {
                MealType::Dinner
            } else {
                continue;
            };

            let content = body
                .text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join("\n");

            meals.insert(meal, content);
        }

        Ok(meals)
    }
}
