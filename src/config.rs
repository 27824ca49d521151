use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Default file looked up in the working directory.
pub const CONFIG_FILE: &str = "harvest.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error("unknown source '{name}' (known: {known})")]
    UnknownSource { name: String, known: String },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Runtime settings. Every field has a default, so an empty environment works.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root for per-source output directories.
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    /// Append-only CSV of rows the loader could not insert.
    pub error_log: PathBuf,
    pub request_timeout_secs: u64,
    pub page_delay_ms: u64,
    pub checkpoint_batch: usize,
    pub max_text_len: usize,
    pub user_agent: String,
    /// DevTools websocket of an already running (and logged in) Chrome.
    pub browser_ws_url: Option<String>,
    /// How long to wait for listings to render before giving up on a page.
    pub browser_wait_secs: u64,
    /// Pause after a click or render before reading the page.
    pub browser_settle_ms: u64,
    pub sources: HashMap<String, SourceOverride>,
}

/// Per-source overrides from the settings file, keyed by source name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceOverride {
    pub url: Option<String>,
    pub paged_url: Option<String>,
    pub max_pages: Option<u32>,
    pub load: LoadOverride,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoadOverride {
    pub table: Option<String>,
    pub numeric: Option<Vec<String>>,
    pub shorthand: Option<Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            db_path: PathBuf::from("data/harvest.sqlite"),
            error_log: PathBuf::from("error_log.csv"),
            request_timeout_secs: 10,
            page_delay_ms: 3000,
            checkpoint_batch: 5,
            max_text_len: 255,
            user_agent: concat!("harvest/", env!("CARGO_PKG_VERSION")).to_string(),
            browser_ws_url: None,
            browser_wait_secs: 120,
            browser_settle_ms: 2000,
            sources: HashMap::new(),
        }
    }
}

impl Settings {
    /// Defaults, then `harvest.toml` (or `$HARVEST_CONFIG`), then `HARVEST_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("HARVEST_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
        Self::load_from(Path::new(&file))
    }

    pub fn load_from(file: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = ::config::Config::builder()
            .add_source(::config::File::from(file).required(false))
            .add_source(
                ::config::Environment::with_prefix("HARVEST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_batch == 0 {
            return Err(ConfigError::Invalid {
                field: "checkpoint_batch",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_text_len == 0 {
            return Err(ConfigError::Invalid {
                field: "max_text_len",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        for (name, o) in &self.sources {
            if o.max_pages == Some(0) {
                return Err(ConfigError::Invalid {
                    field: "sources.max_pages",
                    reason: format!("'{}' needs at least one page", name),
                });
            }
        }
        Ok(())
    }

    /// Overrides for `key`. Environment keys arrive lowercased and may use `_` for `-`.
    pub fn source_override(&self, key: &str) -> Option<&SourceOverride> {
        self.sources
            .get(key)
            .or_else(|| self.sources.get(&key.replace('-', "_")))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn browser_wait(&self) -> Duration {
        Duration::from_secs(self.browser_wait_secs)
    }

    pub fn browser_settle(&self) -> Duration {
        Duration::from_millis(self.browser_settle_ms)
    }
}
