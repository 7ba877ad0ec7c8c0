//! Device identity advertised over discovery and exchanged during pairing.

use crate::config::AppConfig;
use crate::error::{Result, TransferError};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Identity record of a peer. JSON keys match the LanSend wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: String,
    /// Display name
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub operating_system: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub port: u16,
    /// e.g. desktop, laptop, tablet, phone
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub device_model: String,
}

impl DeviceInfo {
    /// Build this process's identity. Called once at startup.
    pub fn local(config: &AppConfig) -> Self {
        Self {
            device_id: generate_device_id(),
            alias: config.alias.clone(),
            hostname: local_hostname(),
            operating_system: std::env::consts::OS.to_string(),
            ip_address: local_ip(),
            port: config.port,
            device_type: config.device_type.clone(),
            device_model: config.device_model.clone(),
        }
    }

    /// A remote identity must at least carry an id and a display name.
    pub fn validate_remote(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(TransferError::Validation(
                "device_info.device_id is required".to_string(),
            ));
        }
        if self.alias.trim().is_empty() {
            return Err(TransferError::Validation(
                "device_info.alias is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<unix millis>_<8 hex chars>`, unique per process run
pub fn generate_device_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", millis, &suffix[..8])
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "Unknown-PC".to_string())
}

/// Get local IP, prioritizing LAN ranges (192.168.x.x, 10.x.x.x, 172.16.x.x)
pub fn local_ip() -> String {
    local_ip_address::list_afinet_netifas()
        .ok()
        .and_then(|ips| {
            let mut best_ip = None;
            for (_name, ip) in ips {
                if ip.is_loopback() || !ip.is_ipv4() {
                    continue;
                }
                let ip_str = ip.to_string();
                if ip_str.starts_with("192.168.") {
                    return Some(ip_str);
                }
                if ip_str.starts_with("10.") {
                    best_ip = Some(ip_str);
                    continue;
                }
                if ip_str.starts_with("172.") && best_ip.is_none() {
                    best_ip = Some(ip_str);
                    continue;
                }
                if best_ip.is_none() {
                    best_ip = Some(ip_str);
                }
            }
            best_ip
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
