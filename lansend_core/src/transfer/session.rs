//! Transfer sessions: one current session, each holding the files a peer
//! announced in its manifest.

use crate::error::{Result, TransferError};
use crate::transfer::constants::DEFAULT_FILE_TYPE;
use crate::transfer::utils::{numbered_file_name, sanitize_file_name, staging_path_for};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Per-file metadata as announced by the sender
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub name: Option<String>,
    /// Byte count; numeric strings such as `"5"` are accepted too
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: u64,
    #[serde(default, rename = "type")]
    pub file_type: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
}

fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Int(u64),
        Float(f64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Int(n) => Ok(n),
        // Whole part only, as the peers' integer conversion does
        Size::Float(f) if f.is_finite() && f >= 0.0 => Ok(f as u64),
        Size::Float(f) => Err(D::Error::custom(format!("invalid file size {}", f))),
        Size::Text(text) => text
            .trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("invalid file size {:?}", text))),
    }
}

/// Bookkeeping for one file of the current session
#[derive(Debug, Clone)]
pub struct FileTransfer {
    pub file_id: String,
    pub declared_name: String,
    pub declared_size: u64,
    pub mime_type: String,
    pub hash: Option<String>,
    pub final_path: PathBuf,
    pub staging_path: PathBuf,
    /// Only ever increases
    pub received_bytes: u64,
    pub completed: bool,
    /// `None` when no hash was announced or the file isn't complete yet
    pub hash_verified: Option<bool>,
}

impl FileTransfer {
    /// `taken` holds the final and staging paths already claimed in this
    /// session; a clashing name gets a `_<n>` suffix.
    fn from_manifest(
        file_id: &str,
        metadata: FileMetadata,
        output_dir: &Path,
        taken: &HashSet<PathBuf>,
    ) -> Self {
        let declared_name = metadata
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{}_unknown", file_id));
        let file_name = sanitize_file_name(&declared_name);

        let mut final_path = output_dir.join(&file_name);
        let mut n = 0;
        while taken.contains(&final_path) || taken.contains(&staging_path_for(&final_path)) {
            n += 1;
            final_path = output_dir.join(numbered_file_name(&file_name, n));
        }
        if n > 0 {
            tracing::info!(
                "Name '{}' of file {} already used in this session, saving as {:?}",
                declared_name,
                file_id,
                final_path
            );
        }
        let staging_path = staging_path_for(&final_path);

        Self {
            file_id: file_id.to_string(),
            declared_name,
            declared_size: metadata.size,
            mime_type: metadata
                .file_type
                .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string()),
            hash: metadata.hash.filter(|h| !h.trim().is_empty()),
            final_path,
            staging_path,
            received_bytes: 0,
            completed: false,
            hash_verified: None,
        }
    }
}

/// Decides whether an announced file is accepted into the session
pub trait AcceptPolicy: Send + Sync {
    fn accept(&self, file: &FileTransfer) -> bool;
}

/// Accepts every announced file
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl AcceptPolicy for AcceptAll {
    fn accept(&self, _file: &FileTransfer) -> bool {
        true
    }
}

pub struct TransferSession {
    pub session_id: String,
    /// Each file has its own lock so different files can be written concurrently
    pub(crate) files: HashMap<String, Mutex<FileTransfer>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOpened {
    pub session_id: String,
    pub accepted_files: HashMap<String, bool>,
    /// Id of the session this one superseded
    #[serde(skip)]
    pub replaced: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionCancelled {
    pub session_id: String,
    #[serde(skip)]
    pub removed_staging_files: usize,
}

pub struct SessionManager {
    output_dir: PathBuf,
    pub(crate) current: RwLock<Option<TransferSession>>,
    policy: Box<dyn AcceptPolicy>,
}

impl SessionManager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::with_policy(output_dir, Box::new(AcceptAll))
    }

    pub fn with_policy(output_dir: impl Into<PathBuf>, policy: Box<dyn AcceptPolicy>) -> Self {
        Self {
            output_dir: output_dir.into(),
            current: RwLock::new(None),
            policy,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Replace the current session with a new one built from `manifest`.
    ///
    /// Every file of the previous session becomes unreachable. Waits for
    /// in-flight chunk writes of the previous session before replacing it.
    pub async fn open_session(
        &self,
        session_id: &str,
        manifest: HashMap<String, FileMetadata>,
    ) -> Result<SessionOpened> {
        if session_id.is_empty() {
            return Err(TransferError::Validation(
                "Missing session_id or files, or invalid files format".to_string(),
            ));
        }

        if !tokio::fs::try_exists(&self.output_dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&self.output_dir).await?;
            tracing::info!("Created output directory: {:?}", self.output_dir);
        }

        let mut accepted_files = HashMap::with_capacity(manifest.len());
        let mut files = HashMap::with_capacity(manifest.len());
        let mut taken = HashSet::new();

        // Sorted so name clashes resolve the same way every time
        let mut entries: Vec<_> = manifest.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (file_id, metadata) in entries {
            let transfer =
                FileTransfer::from_manifest(&file_id, metadata, &self.output_dir, &taken);
            let accepted = self.policy.accept(&transfer);
            if accepted {
                taken.insert(transfer.final_path.clone());
                taken.insert(transfer.staging_path.clone());
                tracing::info!(
                    "Accepting file: ID='{}', Name='{}', Size={}. Saving to {:?} -> {:?}",
                    file_id,
                    transfer.declared_name,
                    transfer.declared_size,
                    transfer.staging_path,
                    transfer.final_path
                );
                files.insert(file_id.clone(), Mutex::new(transfer));
            } else {
                tracing::info!(
                    "Rejecting file: ID='{}', Name='{}'",
                    file_id,
                    transfer.declared_name
                );
            }
            accepted_files.insert(file_id, accepted);
        }

        let mut current = self.current.write().await;
        let replaced = current.replace(TransferSession {
            session_id: session_id.to_string(),
            files,
        });
        let replaced = replaced.map(|old| old.session_id);
        if let Some(old_id) = &replaced {
            tracing::info!("Session {} superseded by {}", old_id, session_id);
        }
        tracing::info!(
            "Session {} opened with {} file(s)",
            session_id,
            accepted_files.len()
        );

        Ok(SessionOpened {
            session_id: session_id.to_string(),
            accepted_files,
            replaced,
        })
    }

    /// Drop the current session if its id matches, deleting the staging
    /// files of transfers that never completed. Completed files are kept.
    pub async fn cancel_session(&self, session_id: &str) -> Result<SessionCancelled> {
        let mut current = self.current.write().await;
        let matches = current
            .as_ref()
            .is_some_and(|s| s.session_id == session_id);
        if !matches {
            return Err(TransferError::SessionMismatch {
                expected: current.as_ref().map(|s| s.session_id.clone()),
                got: Some(session_id.to_string()),
            });
        }

        let mut removed_staging_files = 0;
        if let Some(session) = current.take() {
            for (_, entry) in session.files {
                let transfer = entry.into_inner();
                if transfer.completed {
                    continue;
                }
                match tokio::fs::remove_file(&transfer.staging_path).await {
                    Ok(()) => {
                        removed_staging_files += 1;
                        tracing::info!(
                            "Cleaning up unfinished staging file of \"{}\"",
                            transfer.declared_name
                        );
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => tracing::warn!(
                        "Cannot remove staging file {:?}: {}",
                        transfer.staging_path,
                        e
                    ),
                }
            }
        }
        tracing::info!("Session {} cancelled by the sender", session_id);

        Ok(SessionCancelled {
            session_id: session_id.to_string(),
            removed_staging_files,
        })
    }

    pub async fn current_session_id(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.session_id.clone())
    }

    /// Copy of a file's bookkeeping in the current session
    pub async fn file_snapshot(&self, file_id: &str) -> Option<FileTransfer> {
        let current = self.current.read().await;
        let entry = current.as_ref()?.files.get(file_id)?;
        Some(entry.lock().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(entries: &[(&str, &str, u64)]) -> HashMap<String, FileMetadata> {
        entries
            .iter()
            .map(|(id, name, size)| {
                (
                    id.to_string(),
                    FileMetadata {
                        name: Some(name.to_string()),
                        size: *size,
                        ..FileMetadata::default()
                    },
                )
            })
            .collect()
    }

    struct RejectLarge(u64);

    impl AcceptPolicy for RejectLarge {
        fn accept(&self, file: &FileTransfer) -> bool {
            file.declared_size <= self.0
        }
    }

    #[tokio::test]
    async fn test_open_session_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let manager = SessionManager::new(&out);

        let opened = manager
            .open_session("s1", manifest(&[("f1", "a.txt", 5)]))
            .await
            .unwrap();

        assert!(out.is_dir());
        assert_eq!(opened.accepted_files.get("f1"), Some(&true));
        assert!(opened.replaced.is_none());
    }

    #[tokio::test]
    async fn test_paths_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        manager
            .open_session("s1", manifest(&[("f1", "../../etc/passwd", 1)]))
            .await
            .unwrap();

        let file = manager.file_snapshot("f1").await.unwrap();
        assert_eq!(file.final_path, dir.path().join("passwd"));
        assert_eq!(file.staging_path, dir.path().join("passwd.part"));
        assert_eq!(file.declared_name, "../../etc/passwd");
    }

    #[tokio::test]
    async fn test_missing_name_and_type_get_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        let mut files = HashMap::new();
        files.insert("f7".to_string(), FileMetadata::default());
        manager.open_session("s1", files).await.unwrap();

        let file = manager.file_snapshot("f7").await.unwrap();
        assert_eq!(file.declared_name, "f7_unknown");
        assert_eq!(file.mime_type, "generic");
        assert_eq!(file.declared_size, 0);
    }

    #[test]
    fn test_size_accepts_numeric_strings() {
        let meta: FileMetadata = serde_json::from_str(r#"{"name":"a.txt","size":"5"}"#).unwrap();
        assert_eq!(meta.size, 5);
        let meta: FileMetadata = serde_json::from_str(r#"{"name":"a.txt","size":7}"#).unwrap();
        assert_eq!(meta.size, 7);
        let meta: FileMetadata = serde_json::from_str(r#"{"name":"a.txt"}"#).unwrap();
        assert_eq!(meta.size, 0);

        assert!(serde_json::from_str::<FileMetadata>(r#"{"size":"five"}"#).is_err());
        assert!(serde_json::from_str::<FileMetadata>(r#"{"size":-3}"#).is_err());
    }

    #[tokio::test]
    async fn test_clashing_names_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        manager
            .open_session(
                "s1",
                manifest(&[("f1", "a.txt", 3), ("f2", "x/a.txt", 3), ("f3", "a.txt.part", 1)]),
            )
            .await
            .unwrap();

        let f1 = manager.file_snapshot("f1").await.unwrap();
        let f2 = manager.file_snapshot("f2").await.unwrap();
        let f3 = manager.file_snapshot("f3").await.unwrap();
        assert_eq!(f1.final_path, dir.path().join("a.txt"));
        assert_eq!(f2.final_path, dir.path().join("a_1.txt"));
        assert_eq!(f2.staging_path, dir.path().join("a_1.txt.part"));
        // Would otherwise be f1's staging file
        assert_eq!(f3.final_path, dir.path().join("a.txt_1.part"));
    }

    #[tokio::test]
    async fn test_empty_session_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        let err = manager.open_session("", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, TransferError::Validation(_)));
        assert!(manager.current_session_id().await.is_none());
    }

    #[tokio::test]
    async fn test_policy_can_reject_files() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::with_policy(dir.path(), Box::new(RejectLarge(10)));
        let opened = manager
            .open_session("s1", manifest(&[("small", "s.txt", 5), ("big", "b.bin", 50)]))
            .await
            .unwrap();

        assert_eq!(opened.accepted_files.get("small"), Some(&true));
        assert_eq!(opened.accepted_files.get("big"), Some(&false));
        assert!(manager.file_snapshot("big").await.is_none());
    }

    #[tokio::test]
    async fn test_new_session_reports_replaced_id() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SessionManager::new(dir.path());
        manager
            .open_session("s1", manifest(&[("f1", "a.txt", 5)]))
            .await
            .unwrap();
        let opened = manager.open_session("s2", HashMap::new()).await.unwrap();

        assert_eq!(opened.replaced.as_deref(), Some("s1"));
        assert_eq!(manager.current_session_id().await.as_deref(), Some("s2"));
        assert!(manager.file_snapshot("f1").await.is_none());
    }
}
