use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "lansend";
const APP_NAME: &str = "lansend_receiver";
const CONFIG_FILE: &str = "config.json";

/// Environment variable that relocates the config directory (tests, containers)
pub const CONFIG_DIR_ENV: &str = "LANSEND_CONFIG_DIR";

/// Default HTTPS port, also used as the discovery broadcast port
pub const DEFAULT_PORT: u16 = 56789;
pub const DEFAULT_BROADCAST_PORT: u16 = 56789;
pub const DEFAULT_BROADCAST_INTERVAL_SECS: u64 = 3;
pub const DEFAULT_PIN: &str = "123456";
pub const DEFAULT_OUTPUT_DIR: &str = "received_files";
pub const DEFAULT_CERT_FILE: &str = "cert.pem";
pub const DEFAULT_KEY_FILE: &str = "key.pem";
pub const DEFAULT_ALIAS: &str = "LanSend Rust Receiver";

/// Largest request body accepted by the HTTP shell (32 MiB, one max-size chunk)
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub broadcast_port: u16,
    pub broadcast_interval_secs: u64,
    pub pin: String,
    pub output_dir: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub alias: String,
    pub device_type: String,
    pub device_model: String,
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            broadcast_port: DEFAULT_BROADCAST_PORT,
            broadcast_interval_secs: DEFAULT_BROADCAST_INTERVAL_SECS,
            pin: DEFAULT_PIN.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            cert_path: PathBuf::from(DEFAULT_CERT_FILE),
            key_path: PathBuf::from(DEFAULT_KEY_FILE),
            alias: DEFAULT_ALIAS.to_string(),
            device_type: "desktop".to_string(),
            device_model: "SimulatedPC/Rust".to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl AppConfig {
    /// Get the config file path
    pub fn get_config_path() -> Option<PathBuf> {
        get_config_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Load config from the default location or return defaults.
    ///
    /// A missing or unreadable file is not an error: the receiver runs on
    /// defaults plus command-line overrides.
    pub fn load() -> Self {
        let path = match Self::get_config_path() {
            Some(p) => p,
            None => return Self::default(),
        };

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                if path.exists() {
                    tracing::warn!("Ignoring config file {:?}: {:#}", path, e);
                }
                Self::default()
            }
        }
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], errors propagate.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Save config to disk
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).context("Failed to write config file")?;
        Ok(())
    }

    pub fn broadcast_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.broadcast_interval_secs.max(1))
    }
}

/// Get the config directory path for this app
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}
