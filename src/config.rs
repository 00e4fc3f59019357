//! Configuration loading
//!
//! Settings come from an optional TOML file. Every field has a default, so a
//! run without any config file talks to the public endpoints and reads the
//! Kraken credentials from the environment or `kraken_keys.json`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

use crate::error::ReportError;

pub const KEY_ENV: &str = "KRAKEN_API_KEY";
pub const SECRET_ENV: &str = "KRAKEN_API_SECRET";
const CONFIG_FILENAME: &str = "config.toml";
const APP_DIR: &str = "kraken-rfb";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub kraken: KrakenConfig,
    pub rates: RatesConfig,
    pub exchange: ExchangeInfo,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KrakenConfig {
    pub api_url: String,
    /// JSON file holding `{"key": ..., "secret": ...}`
    pub key_file: PathBuf,
    /// Also read the ledger so staking, transfers and other movements get flagged
    pub include_ledger: bool,
    pub timeout_secs: u64,
}

impl Default for KrakenConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.kraken.com".to_string(),
            key_file: PathBuf::from("kraken_keys.json"),
            include_ledger: true,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    pub bcb_url: String,
    pub coingecko_url: String,
    pub coingecko_api_key: Option<String>,
    pub coingecko_key_header: String,
    /// How many days before the requested date a PTAX quote may come from
    pub fallback_days: i64,
    pub timeout_secs: u64,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            bcb_url: "https://api.bcb.gov.br".to_string(),
            coingecko_url: "https://api.coingecko.com/api/v3".to_string(),
            coingecko_api_key: None,
            coingecko_key_header: "x-cg-demo-api-key".to_string(),
            fallback_days: 7,
            timeout_secs: 30,
        }
    }
}

/// Identification of the foreign exchange as written in the report records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeInfo {
    pub name: String,
    pub url: String,
    /// Country code of the exchange's tax domicile
    pub country: String,
}

impl Default for ExchangeInfo {
    fn default() -> Self {
        Self {
            name: "Kraken".to_string(),
            url: "https://www.kraken.com".to_string(),
            country: "US".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Monthly movement above which the report must be filed
    pub threshold: Decimal,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            threshold: Decimal::from(30_000),
        }
    }
}

/// Kraken API key pair
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ReportError::Config(e.to_string()).into())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| ReportError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_toml(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Load `path` if given, otherwise the default config file when it exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path);
        }

        match default_config_path() {
            Some(default_path) if default_path.exists() => {
                debug!("Loading config from {}", default_path.display());
                Self::load_from(&default_path)
            }
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Credentials from the environment, else from `key_file` (or its override)
    pub fn credentials(&self, key_file_override: Option<&Path>) -> Result<Credentials> {
        let from_env = std::env::var(KEY_ENV).ok().zip(std::env::var(SECRET_ENV).ok());
        if let Some((key, secret)) = from_env {
            if !key.is_empty() && !secret.is_empty() {
                debug!("Using Kraken credentials from environment");
                return Ok(Credentials { key, secret });
            }
        }

        let path = key_file_override.unwrap_or(&self.kraken.key_file);
        load_key_file(path)
    }
}

pub fn load_key_file(path: &Path) -> Result<Credentials> {
    let raw = fs::read_to_string(path).map_err(|e| {
        ReportError::Config(format!(
            "no Kraken credentials: set {}/{} or provide key file {} ({})",
            KEY_ENV,
            SECRET_ENV,
            path.display(),
            e
        ))
    })?;
    let credentials: Credentials = serde_json::from_str(&raw).map_err(|e| {
        ReportError::Config(format!("invalid key file {}: {}", path.display(), e))
    })?;
    Ok(credentials)
}

pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dir_spec::config_home)
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

/// Parse a BRL amount given on the command line or in config
pub fn parse_amount(value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim())
        .map_err(|e| ReportError::Config(format!("invalid amount '{}': {}", value, e)).into())
}
