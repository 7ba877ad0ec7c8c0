//! PIN-gated pairing.
//!
//! Holds a single "connected peer" slot. The last successful pairing wins;
//! the slot is only cleared by restarting the process.

use crate::error::{Result, TransferError};
use crate::identity::DeviceInfo;
use rand::Rng;
use tokio::sync::RwLock;

/// Outcome of a successful pairing
#[derive(Debug, Clone)]
pub struct Paired {
    /// Peer that held the slot before this call, if any
    pub replaced: Option<DeviceInfo>,
}

pub struct PairingGate {
    expected_pin: String,
    connected_peer: RwLock<Option<DeviceInfo>>,
}

impl PairingGate {
    pub fn new(expected_pin: impl Into<String>) -> Self {
        Self {
            expected_pin: expected_pin.into(),
            connected_peer: RwLock::new(None),
        }
    }

    /// Validate `pin` and, on match, make `remote` the connected peer.
    ///
    /// Malformed input is a [`TransferError::Validation`], a wrong PIN is
    /// [`TransferError::InvalidPin`]; neither touches the slot.
    pub async fn pair(&self, pin: &str, remote: DeviceInfo) -> Result<Paired> {
        if pin.is_empty() {
            return Err(TransferError::Validation("Missing pin_code".to_string()));
        }
        remote.validate_remote()?;

        if pin != self.expected_pin {
            tracing::warn!(
                "Invalid PIN received from {} ({})",
                remote.alias,
                remote.device_id
            );
            return Err(TransferError::InvalidPin);
        }

        let mut slot = self.connected_peer.write().await;
        let replaced = slot.replace(remote.clone());
        match &replaced {
            Some(previous) if previous.device_id != remote.device_id => tracing::info!(
                "Connected peer replaced: {} ({}) -> {} ({})",
                previous.alias,
                previous.device_id,
                remote.alias,
                remote.device_id
            ),
            _ => tracing::info!(
                "Connection accepted from: {} ({})",
                remote.alias,
                remote.device_id
            ),
        }

        Ok(Paired { replaced })
    }

    pub async fn connected_peer(&self) -> Option<DeviceInfo> {
        self.connected_peer.read().await.clone()
    }

    pub async fn is_paired(&self) -> bool {
        self.connected_peer.read().await.is_some()
    }

    /// Fail with [`TransferError::NotPaired`] unless a peer is connected
    pub async fn require_paired(&self) -> Result<()> {
        if self.is_paired().await {
            Ok(())
        } else {
            Err(TransferError::NotPaired)
        }
    }
}

/// Random 6-digit PIN for operators who don't want the fixed default
pub fn generate_pin() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{:06}", code)
}
