//! Configuration loading and root folder resolution

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::settings::MarketSettings;
use crate::variant::Market;
use crate::{Error, Result};

/// Environment variable naming the data root folder
pub const ROOT_ENV_VAR: &str = "PRICEDESK_ROOT";

/// Engine configuration (TOML)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub root_folder: Option<PathBuf>,
    /// Database file name, relative to the root folder
    pub database_file: String,
    /// Broadcast channel capacity for pricing events
    pub event_capacity: usize,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    /// Settings seeds per market code, layered over that market's built-in
    /// default; persisted settings take precedence
    pub markets: BTreeMap<String, toml::Table>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Backend base URL; None disables HTTP sync
    pub base_url: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_file: "pricedesk.db".to_string(),
            event_capacity: 1000,
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
            markets: BTreeMap::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 30_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {e}")))
    }

    /// Load configuration
    ///
    /// An explicit path must exist and parse. Without one, the default
    /// location is used when present, built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Cannot read config {}: {e}", path.display()))
            })?;
            return Self::from_toml_str(&content);
        }

        match default_config_path().filter(|path| path.exists()) {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Market seeds with normalized codes
    ///
    /// Each `[markets.<CODE>]` table only needs the fields it changes. A
    /// table with an unknown key or a mistyped value is skipped with a
    /// warning and the market keeps its built-in default.
    pub fn market_seeds(&self) -> Vec<(Market, MarketSettings)> {
        self.markets
            .iter()
            .filter_map(|(code, table)| {
                let market = Market::new(code);
                match layer_seed(&market, table) {
                    Ok(settings) => Some((market, settings)),
                    Err(e) => {
                        warn!(
                            market = %market,
                            "Malformed [markets.{}] table, using built-in default: {}",
                            code,
                            e
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Store full settings as the seed for a market
    pub fn set_market_seed(&mut self, market: &Market, settings: &MarketSettings) -> Result<()> {
        let table = match toml::Value::try_from(settings) {
            Ok(toml::Value::Table(table)) => table,
            Ok(other) => {
                return Err(Error::Config(format!(
                    "Market settings serialized to {}, expected a table",
                    other.type_str()
                )))
            }
            Err(e) => return Err(Error::Config(format!("Cannot encode market settings: {e}"))),
        };
        self.markets.insert(market.code().to_string(), table);
        Ok(())
    }

    /// Database location under a resolved root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.database_file)
    }
}

fn layer_seed(market: &Market, table: &toml::Table) -> std::result::Result<MarketSettings, String> {
    let mut layered = match toml::Value::try_from(MarketSettings::default_for(market)) {
        Ok(toml::Value::Table(base)) => base,
        Ok(_) => return Err("built-in default is not a table".to_string()),
        Err(e) => return Err(e.to_string()),
    };
    for (key, value) in table {
        if !MarketSettings::metadata().iter().any(|meta| meta.key == key.as_str()) {
            return Err(format!("unknown setting `{key}`"));
        }
        layered.insert(key.clone(), value.clone());
    }
    toml::Value::Table(layered)
        .try_into()
        .map_err(|e: toml::de::Error| e.to_string())
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `root_folder` from the config file
/// 4. OS-dependent default
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: &EngineConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
        warn!("{} is set but empty, ignoring", env_var_name);
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// `<config_dir>/pricedesk/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pricedesk").join("config.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pricedesk"))
        .unwrap_or_else(|| PathBuf::from("./pricedesk_data"))
}
