//! Configuration file support for dxspot.
//!
//! Loads settings from `~/.config/dxspot/config.toml` on Linux
//! (or platform-appropriate location on other OSes).

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{DEFAULT_LOGIN_PROMPTS, RBN_HOST, RBN_PORT_CW, SpotClientConfig};
use crate::filter::SpotFilter;

/// Application configuration loaded from TOML file.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Callsign to use for cluster login.
    pub callsign: String,

    /// Cluster server hostname.
    pub host: String,

    /// Cluster server port.
    pub port: u16,

    /// Connection timeout in seconds.
    pub connect_timeout: u64,

    /// Read timeout in seconds (0 disables it).
    pub read_timeout: u64,

    /// Whether to automatically reconnect on disconnect.
    pub reconnect: bool,

    /// Seconds to wait before reconnecting.
    pub reconnect_delay: u64,

    /// Server texts that trigger the login write.
    pub login_prompts: Vec<String>,

    /// Path of the cty.dat entity database.
    pub cty_path: PathBuf,

    /// Where to download cty.dat from when `cty_path` is missing.
    pub cty_url: Option<String>,

    /// JSON file of entity/band pairs already confirmed.
    pub progress_path: Option<PathBuf>,

    /// Show spots whose callsign did not resolve to an entity.
    pub show_unresolved: bool,

    /// Print statistics every N seconds (0 disables it).
    pub stats_interval: u64,

    /// Enable Prometheus metrics HTTP endpoint.
    pub metrics_enabled: bool,

    /// Port for Prometheus metrics HTTP endpoint.
    pub metrics_port: u16,

    /// Spot filters for selective output.
    pub filters: Vec<SpotFilter>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            callsign: "N0CALL".to_string(),
            host: RBN_HOST.to_string(),
            port: RBN_PORT_CW,
            connect_timeout: 30,
            read_timeout: 0,
            reconnect: true,
            reconnect_delay: 5,
            login_prompts: DEFAULT_LOGIN_PROMPTS.iter().map(|p| p.to_string()).collect(),
            cty_path: PathBuf::from("cty.dat"),
            cty_url: None,
            progress_path: None,
            show_unresolved: true,
            stats_interval: 60,
            metrics_enabled: false,
            metrics_port: 9090,
            filters: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default config file location.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML in config file: {}", path.display()))
    }

    /// Returns the path to the config file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dxspot/config.toml"))
    }

    /// Validate all configuration settings.
    ///
    /// Returns an error if any filters have invalid patterns.
    pub fn validate(&self) -> Result<()> {
        if self.callsign.trim().is_empty() {
            bail!("callsign must not be empty");
        }
        if self.login_prompts.iter().all(|p| p.trim().is_empty()) {
            bail!("at least one login prompt is required");
        }
        for (i, filter) in self.filters.iter().enumerate() {
            filter
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid filter [{}]: {}", i, e))?;
        }
        Ok(())
    }

    /// Client settings derived from this configuration.
    pub fn client_config(&self) -> SpotClientConfig {
        SpotClientConfig {
            login_prompts: self.login_prompts.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            read_timeout: (self.read_timeout > 0).then(|| Duration::from_secs(self.read_timeout)),
            ..SpotClientConfig::with_callsign(&self.callsign).with_server(&self.host, self.port)
        }
    }
}
