//! User configuration.
//!
//! Values come from `config.toml` in the app config directory, then from
//! environment variables and CLI flags (applied by the caller through
//! [`Config::apply_overrides`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants;
use crate::core::classifier::vpn_prefix_from_network;
use crate::error::ConfigError;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Portal base URL.
    pub portal_url: String,
    /// VPN network in CIDR form, e.g. `10.8.0.0/24`.
    pub vpn_network: String,
    pub health_interval_secs: u64,
    pub vpn_interval_secs: u64,
    pub diagnostics_interval_secs: u64,
    pub request_timeout_secs: u64,
    /// `host:port` of the rendezvous server for candidate gathering.
    pub rendezvous_server: String,
    /// Where downloaded configurations are saved.
    pub download_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: constants::DEFAULT_PORTAL_URL.to_string(),
            vpn_network: constants::DEFAULT_VPN_NETWORK.to_string(),
            health_interval_secs: constants::HEALTH_POLL_RATE.as_secs(),
            vpn_interval_secs: constants::VPN_POLL_RATE.as_secs(),
            diagnostics_interval_secs: constants::DIAGNOSTICS_POLL_RATE.as_secs(),
            request_timeout_secs: constants::HTTP_TIMEOUT_SECS,
            rendezvous_server: constants::DEFAULT_RENDEZVOUS_SERVER.to_string(),
            download_dir: None,
        }
    }
}

/// Overrides taken from the environment or command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub portal_url: Option<String>,
    pub vpn_network: Option<String>,
    pub health_interval_secs: Option<u64>,
}

impl Config {
    /// Loads `path`, falling back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies non-empty overrides on top of the loaded values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the resulting portal URL does not parse.
    pub fn apply_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(url) = overrides.portal_url.filter(|u| !u.trim().is_empty()) {
            self.portal_url = url;
        }
        if let Some(network) = overrides.vpn_network.filter(|n| !n.trim().is_empty()) {
            self.vpn_network = network;
        }
        if let Some(secs) = overrides.health_interval_secs.filter(|s| *s > 0) {
            self.health_interval_secs = secs;
        }

        Url::parse(&self.portal_url).map_err(|_| ConfigError::InvalidUrl(self.portal_url.clone()))?;
        self.portal_url = self.portal_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Prefix used by the classifier.
    #[must_use]
    pub fn vpn_prefix(&self) -> String {
        vpn_prefix_from_network(&self.vpn_network)
    }

    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }

    #[must_use]
    pub fn vpn_interval(&self) -> Duration {
        Duration::from_secs(self.vpn_interval_secs.max(1))
    }

    #[must_use]
    pub fn diagnostics_interval(&self) -> Duration {
        Duration::from_secs(self.diagnostics_interval_secs.max(1))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Download directory, defaulting to the user's download folder.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .or_else(dirs::download_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// App config directory (`~/.config/vpnscope` on Linux).
#[must_use]
pub fn app_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(constants::APP_NAME)
}

/// Default configuration file path.
#[must_use]
pub fn default_config_path() -> PathBuf {
    app_config_dir().join(constants::CONFIG_FILE_NAME)
}

/// Where the signed-in session is persisted.
#[must_use]
pub fn session_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join("session.json")
}
