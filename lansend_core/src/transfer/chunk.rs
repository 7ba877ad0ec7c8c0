//! Sequential chunk reception with atomic finalize.
//!
//! Chunks are appended in arrival order. The transport must deliver the
//! chunks of one file in order and exactly once; nothing here detects
//! reordering or duplicates.

use crate::error::{Result, TransferError};
use crate::transfer::hash::{compute_file_hash, hashes_match};
use crate::transfer::session::{FileTransfer, SessionManager};
use crate::transfer::utils::open_staging_file;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Receiving,
    Completed,
    Error,
}

/// Result of one chunk write, serialized as the response body
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub session_id: String,
    pub file_id: String,
    pub status: ChunkStatus,
    pub processed_bytes: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_verified: Option<bool>,
}

impl SessionManager {
    /// Append `bytes` to the staging file of `file_id` in session `session_id`.
    ///
    /// Fails with [`TransferError::SessionMismatch`] unless `session_id` is
    /// the current session, then with [`TransferError::FileNotFound`] if the
    /// file isn't part of it. I/O failures are not errors here: they come
    /// back as a report with [`ChunkStatus::Error`].
    pub async fn write_chunk(
        &self,
        session_id: Option<&str>,
        file_id: &str,
        bytes: &[u8],
    ) -> Result<ChunkReport> {
        // Held for the whole write so a new session can't replace this one mid-chunk
        let current = self.current.read().await;

        let session = match current.as_ref() {
            Some(session) if Some(session.session_id.as_str()) == session_id => session,
            other => {
                let expected = other.map(|s| s.session_id.clone());
                tracing::warn!(
                    "Session ID mismatch for file data. FileID: {}. Expected Session: {:?}, Got Session: {:?}",
                    file_id,
                    expected,
                    session_id
                );
                return Err(TransferError::SessionMismatch {
                    expected,
                    got: session_id.map(str::to_string),
                });
            }
        };

        let Some(entry) = session.files.get(file_id) else {
            tracing::warn!(
                "Unknown file_id in file data: {}. Active transfers: {:?}",
                file_id,
                session.files.keys().collect::<Vec<_>>()
            );
            return Err(TransferError::FileNotFound(file_id.to_string()));
        };

        let mut transfer = entry.lock().await;
        Ok(receive_chunk(&session.session_id, &mut transfer, bytes).await)
    }
}

/// Append one chunk and finalize the file once the declared size is reached
pub async fn receive_chunk(
    session_id: &str,
    transfer: &mut FileTransfer,
    bytes: &[u8],
) -> ChunkReport {
    if transfer.completed {
        // The staging file was promoted; there is nothing left to append to
        tracing::warn!(
            "Chunk for already completed file '{}' (ID: {}) ignored",
            transfer.declared_name,
            transfer.file_id
        );
        return report(session_id, transfer, ChunkStatus::Completed, "File already completed");
    }

    if let Err(e) = append(transfer, bytes).await {
        tracing::error!(
            "Error writing file data for {}: {}",
            transfer.file_id,
            e
        );
        return report(session_id, transfer, ChunkStatus::Error, &e.to_string());
    }
    transfer.received_bytes += bytes.len() as u64;

    tracing::debug!(
        "File data: ID='{}', Name='{}', Received {} bytes. Total: {}/{}",
        transfer.file_id,
        transfer.declared_name,
        bytes.len(),
        transfer.received_bytes,
        transfer.declared_size
    );

    if transfer.received_bytes < transfer.declared_size {
        return report(
            session_id,
            transfer,
            ChunkStatus::Receiving,
            "Chunk processed successfully",
        );
    }

    // Overshoot (received > declared) also counts as complete
    match finalize(transfer).await {
        Ok(()) => {
            tracing::info!(
                "File '{}' (ID: {}) received completely and saved to {:?}.",
                transfer.declared_name,
                transfer.file_id,
                transfer.final_path
            );
            let message = match transfer.hash_verified {
                Some(false) => "File transfer completed (hash mismatch)",
                _ => "File transfer completed",
            };
            report(session_id, transfer, ChunkStatus::Completed, message)
        }
        Err(e) => {
            tracing::error!(
                "Error finalizing file {} ({:?}): {}",
                transfer.file_id,
                transfer.final_path,
                e
            );
            report(session_id, transfer, ChunkStatus::Error, &e.to_string())
        }
    }
}

async fn append(transfer: &FileTransfer, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = open_staging_file(&transfer.staging_path, transfer.received_bytes).await?;
    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;

    if let Err(e) = written {
        // Drop a partially written chunk so the sender can resend it whole
        if let Err(trunc_err) = file.set_len(transfer.received_bytes).await {
            tracing::warn!(
                "Cannot roll back partial chunk in {:?}: {}",
                transfer.staging_path,
                trunc_err
            );
        }
        return Err(e);
    }
    Ok(())
}

/// Verify the optional hash, then atomically move the staging file into place
async fn finalize(transfer: &mut FileTransfer) -> std::io::Result<()> {
    if let Some(expected) = &transfer.hash {
        let computed = compute_file_hash(&transfer.staging_path).await?;
        let verified = hashes_match(expected, &computed);
        if !verified {
            tracing::warn!(
                "Hash mismatch for '{}': expected {}, got {}",
                transfer.declared_name,
                expected,
                computed
            );
        }
        transfer.hash_verified = Some(verified);
    }

    // A file left over from an earlier transfer is replaced
    match tokio::fs::remove_file(&transfer.final_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::rename(&transfer.staging_path, &transfer.final_path).await?;
    transfer.completed = true;
    Ok(())
}

fn report(
    session_id: &str,
    transfer: &FileTransfer,
    status: ChunkStatus,
    message: &str,
) -> ChunkReport {
    ChunkReport {
        session_id: session_id.to_string(),
        file_id: transfer.file_id.clone(),
        status,
        processed_bytes: transfer.received_bytes,
        message: message.to_string(),
        hash_verified: transfer.hash_verified,
    }
}
