// ⚙️ Configuration - environment (.env supported) with CLI overrides applied in main

use crate::normalizer::NormalizeRules;
use crate::publisher::DEFAULT_CUTOVER_HOUR;
use crate::source::DEFAULT_MENU_URL;
use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// STORE BACKEND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StoreKind {
    /// SQLite database `<data_dir>/cardapio.db`
    Sqlite,
    /// menu_hash_*.txt + message_ids.txt under `<data_dir>`
    Files,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StoreKind::Sqlite),
            "files" | "file" => Ok(StoreKind::Files),
            other => bail!("unknown store backend '{}' (expected sqlite or files)", other),
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// One day; longer intervals would never tick between purges
pub const MAX_TICK_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// Bot token; required only for live sends
    pub telegram_token: Option<String>,

    /// Target chat (e.g. "@ru_ufes" or "-100123...")
    pub channel_id: Option<String>,

    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub menu_url: String,

    /// Hour (0-23) at which dinner becomes the active meal
    pub cutover_hour: u32,

    pub tick_minutes: i64,
    pub purge_at: NaiveTime,

    /// Overrides the default boilerplate block-list when set
    pub blocklist: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            telegram_token: None,
            channel_id: None,
            data_dir: PathBuf::from("data"),
            store: StoreKind::Sqlite,
            menu_url: DEFAULT_MENU_URL.to_string(),
            cutover_hour: DEFAULT_CUTOVER_HOUR,
            tick_minutes: 6,
            purge_at: NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
            blocklist: None,
        }
    }
}

impl Config {
    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        config.telegram_token = get("TELEGRAM_TOKEN");
        config.channel_id = get("CHANNEL_ID");

        if let Some(dir) = get("CARDAPIO_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(store) = get("CARDAPIO_STORE") {
            config.store = store.parse().context("CARDAPIO_STORE")?;
        }
        if let Some(url) = get("CARDAPIO_MENU_URL") {
            config.menu_url = url;
        }
        if let Some(hour) = get("CARDAPIO_CUTOVER_HOUR") {
            config.cutover_hour = hour
                .parse()
                .with_context(|| format!("CARDAPIO_CUTOVER_HOUR is not a number: {}", hour))?;
        }
        if let Some(minutes) = get("CARDAPIO_TICK_MINUTES") {
            config.tick_minutes = minutes
                .parse()
                .with_context(|| format!("CARDAPIO_TICK_MINUTES is not a number: {}", minutes))?;
        }
        if let Some(purge_at) = get("CARDAPIO_PURGE_AT") {
            config.purge_at = NaiveTime::parse_from_str(&purge_at, "%H:%M")
                .with_context(|| format!("CARDAPIO_PURGE_AT must be HH:MM, got {}", purge_at))?;
        }
        if let Some(list) = get("CARDAPIO_BLOCKLIST") {
            config.blocklist = Some(
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cutover_hour > 23 {
            bail!("cutover hour must be 0-23, got {}", self.cutover_hour);
        }
        if !(1..=MAX_TICK_MINUTES).contains(&self.tick_minutes) {
            bail!(
                "tick interval must be 1-{} minutes, got {}",
                MAX_TICK_MINUTES,
                self.tick_minutes
            );
        }
        Ok(())
    }

    pub fn normalize_rules(&self) -> NormalizeRules {
        match &self.blocklist {
            Some(list) => NormalizeRules::default().with_blocklist(list.clone()),
            None => NormalizeRules::default(),
        }
    }

    /// Token and chat id, or an error explaining what is missing
    pub fn telegram_credentials(&self) -> Result<(&str, &str)> {
        match (&self.telegram_token, &self.channel_id) {
            (Some(token), Some(chat)) => Ok((token.as_str(), chat.as_str())),
            _ => bail!("TELEGRAM_TOKEN and CHANNEL_ID must be set (or use --dry-run)"),
        }
    }
}
