use std::fs;
use std::path::{Path, PathBuf};

use income_proto::Network;

use crate::ReportError;

pub const ENV_LCD_URL: &str = "INCOME_REPORTER_LCD_URL";
pub const ENV_DENOM: &str = "INCOME_REPORTER_DENOM";
pub const ENV_NETWORK: &str = "INCOME_REPORTER_NETWORK";
pub const ENV_VALIDATOR_PREFIX: &str = "INCOME_REPORTER_VALIDATOR_PREFIX";
pub const ENV_TIMEOUT_MS: &str = "INCOME_REPORTER_TIMEOUT_MS";
pub const ENV_STATE_PATH: &str = "INCOME_REPORTER_STATE_PATH";
pub const ENV_TX_PAGE_LIMIT: &str = "INCOME_REPORTER_TX_PAGE_LIMIT";

pub const DEFAULT_CONFIG_FILE_NAME: &str = "income_reporter.toml";
pub const DEFAULT_DENOM: &str = "uatom";
pub const DEFAULT_NETWORK: Network = Network::CosmosHub4;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_STATE_PATH: &str = "income_reporter_state.json";
pub const DEFAULT_TX_PAGE_LIMIT: u64 = 100;
/// Largest page the tx search endpoint serves in one response.
pub const MAX_TX_PAGE_LIMIT: u64 = 100;

/// What the income calculator needs to know about the chain it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomeConfig {
    pub denom: String,
    pub network: Network,
    /// `None` derives the operator prefix from each account address.
    pub validator_prefix: Option<String>,
}

impl IncomeConfig {
    pub fn new(denom: impl Into<String>, network: Network) -> Result<Self, ReportError> {
        let denom = denom.into();
        if denom.trim().is_empty() {
            return Err(ReportError::InvalidConfig {
                reason: "denom cannot be empty".to_string(),
            });
        }
        Ok(Self {
            denom,
            network,
            validator_prefix: None,
        })
    }

    pub fn with_validator_prefix(mut self, prefix: impl Into<String>) -> Result<Self, ReportError> {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Err(ReportError::InvalidConfig {
                reason: "validator prefix cannot be empty".to_string(),
            });
        }
        self.validator_prefix = Some(prefix);
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReporterConfig {
    pub lcd_url: String,
    pub income: IncomeConfig,
    pub timeout_ms: u64,
    pub state_path: PathBuf,
    pub tx_page_limit: u64,
}

impl ReporterConfig {
    pub fn from_source(source: &ConfigSource) -> Result<Self, ReportError> {
        Self::from_env_with(|key| source.get(key))
    }

    pub fn from_env_with<F>(mut getter: F) -> Result<Self, ReportError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let lcd_url = getter(ENV_LCD_URL)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ReportError::InvalidConfig {
                reason: format!("missing {}", ENV_LCD_URL),
            })?;
        let denom = non_empty(&mut getter, ENV_DENOM).unwrap_or_else(|| DEFAULT_DENOM.to_string());
        let network = match non_empty(&mut getter, ENV_NETWORK) {
            Some(value) => value
                .parse::<Network>()
                .map_err(|reason| ReportError::InvalidConfig { reason })?,
            None => DEFAULT_NETWORK,
        };
        let mut income = IncomeConfig::new(denom, network)?;
        if let Some(prefix) = non_empty(&mut getter, ENV_VALIDATOR_PREFIX) {
            income = income.with_validator_prefix(prefix)?;
        }
        let timeout_ms = positive_u64(&mut getter, ENV_TIMEOUT_MS, DEFAULT_TIMEOUT_MS)?;
        let tx_page_limit = positive_u64(&mut getter, ENV_TX_PAGE_LIMIT, DEFAULT_TX_PAGE_LIMIT)?;
        if tx_page_limit > MAX_TX_PAGE_LIMIT {
            return Err(ReportError::InvalidConfig {
                reason: format!(
                    "{} must be at most {}, got {}",
                    ENV_TX_PAGE_LIMIT, MAX_TX_PAGE_LIMIT, tx_page_limit
                ),
            });
        }
        let state_path = non_empty(&mut getter, ENV_STATE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH));

        Ok(Self {
            lcd_url: lcd_url.trim_end_matches('/').to_string(),
            income,
            timeout_ms,
            state_path,
            tx_page_limit,
        })
    }
}

/// Key lookup over an optional TOML table keyed by the env variable names.
/// Keys missing from the table fall back to the environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSource {
    table: Option<toml::Table>,
}

impl ConfigSource {
    pub fn from_default_sources() -> Result<Self, ReportError> {
        let config_path = Path::new(DEFAULT_CONFIG_FILE_NAME);
        if config_path.exists() {
            return Self::from_config_file(config_path);
        }
        Ok(Self::env())
    }

    pub fn from_config_file(path: &Path) -> Result<Self, ReportError> {
        let content = fs::read_to_string(path).map_err(|err| ReportError::InvalidConfig {
            reason: format!("read config file {} failed: {}", path.display(), err),
        })?;
        let value: toml::Value =
            toml::from_str(&content).map_err(|err| ReportError::InvalidConfig {
                reason: format!("parse config file {} failed: {}", path.display(), err),
            })?;
        let table = value
            .as_table()
            .cloned()
            .ok_or_else(|| ReportError::InvalidConfig {
                reason: format!("config file {} root is not a TOML table", path.display()),
            })?;
        Ok(Self { table: Some(table) })
    }

    pub fn env() -> Self {
        Self { table: None }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.table
            .as_ref()
            .and_then(|table| table.get(key))
            .and_then(toml_value_to_string)
            .or_else(|| std::env::var(key).ok())
    }

    /// Ledger location without requiring the chain endpoint settings.
    pub fn state_path(&self) -> PathBuf {
        let mut getter = |key: &str| self.get(key);
        non_empty(&mut getter, ENV_STATE_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH))
    }
}

fn non_empty<F>(getter: &mut F, key: &str) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    getter(key).filter(|value| !value.trim().is_empty())
}

fn positive_u64<F>(getter: &mut F, key: &str, default: u64) -> Result<u64, ReportError>
where
    F: FnMut(&str) -> Option<String>,
{
    match non_empty(getter, key) {
        Some(value) => value
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|parsed| *parsed > 0)
            .ok_or_else(|| ReportError::InvalidConfig {
                reason: format!("{} must be a positive integer, got {}", key, value),
            }),
        None => Ok(default),
    }
}

fn toml_value_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(value) => Some(value.clone()),
        toml::Value::Integer(value) => Some(value.to_string()),
        toml::Value::Float(value) => Some(value.to_string()),
        toml::Value::Boolean(value) => Some(value.to_string()),
        _ => None,
    }
}
