//! Receiver context shared by every connection.

use crate::error::Result;
use crate::identity::DeviceInfo;
use crate::pairing::{Paired, PairingGate};
use crate::transfer::{
    AcceptPolicy, ChunkReport, FileMetadata, SessionCancelled, SessionManager, SessionOpened,
};
use std::collections::HashMap;
use std::path::PathBuf;

/// Everything a request handler needs: this device's identity, the
/// pairing slot and the current transfer session.
pub struct ReceiverState {
    pub device: DeviceInfo,
    pub pairing: PairingGate,
    pub sessions: SessionManager,
}

impl ReceiverState {
    pub fn new(device: DeviceInfo, pin: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            device,
            pairing: PairingGate::new(pin),
            sessions: SessionManager::new(output_dir),
        }
    }

    pub fn with_policy(
        device: DeviceInfo,
        pin: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        policy: Box<dyn AcceptPolicy>,
    ) -> Self {
        Self {
            device,
            pairing: PairingGate::new(pin),
            sessions: SessionManager::with_policy(output_dir, policy),
        }
    }

    /// Pair with `remote`. On success returns this device's identity.
    pub async fn pair(&self, pin: &str, remote: DeviceInfo) -> Result<(DeviceInfo, Paired)> {
        let paired = self.pairing.pair(pin, remote).await?;
        Ok((self.device.clone(), paired))
    }

    /// Open a session; requires an active pairing, checked before anything else
    pub async fn open_session(
        &self,
        session_id: &str,
        manifest: HashMap<String, FileMetadata>,
    ) -> Result<SessionOpened> {
        self.pairing.require_paired().await?;
        self.sessions.open_session(session_id, manifest).await
    }

    pub async fn write_chunk(
        &self,
        session_id: Option<&str>,
        file_id: &str,
        bytes: &[u8],
    ) -> Result<ChunkReport> {
        self.sessions.write_chunk(session_id, file_id, bytes).await
    }

    pub async fn cancel_session(&self, session_id: &str) -> Result<SessionCancelled> {
        self.pairing.require_paired().await?;
        self.sessions.cancel_session(session_id).await
    }
}
