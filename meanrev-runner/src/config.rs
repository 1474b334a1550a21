//! Bot configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! the stock strategy: 50 large caps, $100 per position, a 30-day z-score
//! window and a five-day holding limit. API credentials are never read from
//! the file; they come from `ALPACA_API_KEY` / `ALPACA_SECRET_KEY`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use meanrev_core::orders::CoordinatorConfig;
use meanrev_core::signals::SignalConfig;

pub const API_KEY_ENV: &str = "ALPACA_API_KEY";
pub const SECRET_KEY_ENV: &str = "ALPACA_SECRET_KEY";

const DEFAULT_UNIVERSE: [&str; 50] = [
    "AAPL", "MSFT", "GOOG", "AMZN", "TSLA", "NVDA", "BRK-A", "JPM", "JNJ", "V", //
    "PG", "UNH", "HD", "MA", "BAC", "DIS", "PYPL", "ADBE", "CMCSA", "XOM", //
    "NFLX", "T", "CSCO", "PEP", "CVX", "ABT", "MRK", "PFE", "NKE", "KO", //
    "MCD", "WMT", "CRM", "INTC", "VZ", "LLY", "ABBV", "NEE", "MDT", "COST", //
    "BMY", "HON", "LIN", "SBUX", "BLK", "AMT", "GS", "CAT", "AXP", "BA",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing environment variable {0}")]
    MissingCredential(&'static str),
}

/// Where state and the trade ledger live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Global pending store, per-run snapshots and `bot.log`.
    pub state_dir: PathBuf,
    pub trades_csv: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            trades_csv: PathBuf::from("trades.csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Paper trading endpoint when true, live otherwise.
    pub paper: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { paper: true }
    }
}

/// Full bot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub universe: Vec<String>,
    pub position_size_usd: f64,
    /// Calendar days; a position this old closes at MAX_HOLD.
    pub max_holding_days: i64,
    pub pdt_limit: u32,
    /// Extra calendar days requested on top of the window, to cover
    /// weekends and holidays.
    pub history_buffer_days: i64,
    pub signal: SignalConfig,
    pub paths: PathsConfig,
    pub broker: BrokerConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            universe: DEFAULT_UNIVERSE.iter().map(|t| t.to_string()).collect(),
            position_size_usd: 100.0,
            max_holding_days: 5,
            pdt_limit: 3,
            history_buffer_days: 20,
            signal: SignalConfig::default(),
            paths: PathsConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let s = &self.signal;

        if self.universe.is_empty() {
            return invalid("universe is empty".into());
        }
        if let Some(t) = self.universe.iter().find(|t| t.trim().is_empty()) {
            return invalid(format!("blank ticker in universe: {t:?}"));
        }
        if !(self.position_size_usd.is_finite() && self.position_size_usd > 0.0) {
            return invalid(format!("position_size_usd must be positive, got {}", self.position_size_usd));
        }
        if self.max_holding_days < 1 {
            return invalid(format!("max_holding_days must be at least 1, got {}", self.max_holding_days));
        }
        if self.history_buffer_days < 0 {
            return invalid(format!("history_buffer_days must not be negative, got {}", self.history_buffer_days));
        }
        if s.window < 2 {
            return invalid(format!("signal.window must be at least 2, got {}", s.window));
        }
        if s.entry_long >= s.entry_short {
            return invalid(format!(
                "signal.entry_long ({}) must be below signal.entry_short ({})",
                s.entry_long, s.entry_short
            ));
        }
        if !(s.exit_band.lower <= 0.0 && 0.0 <= s.exit_band.upper) {
            return invalid(format!(
                "signal.exit_band [{}, {}] must contain zero",
                s.exit_band.lower, s.exit_band.upper
            ));
        }
        if s.stop_loss <= s.entry_long.abs() || s.stop_loss <= s.entry_short.abs() {
            return invalid(format!(
                "signal.stop_loss ({}) must lie outside the entry thresholds",
                s.stop_loss
            ));
        }
        Ok(())
    }

    /// BLAKE3 hash of the canonical JSON form, recorded in each run manifest.
    pub fn fingerprint(&self) -> String {
        // Only a non-UTF-8 path can fail to serialize.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            position_size_usd: self.position_size_usd,
            max_holding_days: self.max_holding_days,
            pdt_limit: self.pdt_limit,
        }
    }
}

/// API key pair read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub key_id: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self, ConfigError> {
        let read = |name: &'static str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingCredential(name))
        };
        Ok(Self {
            key_id: read(API_KEY_ENV)?,
            secret_key: read(SECRET_KEY_ENV)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
