//! Transfer sessions and chunked file reception.
//!
//! This module provides:
//! - Session bookkeeping (one current session, replaced on each new request)
//! - Sequential chunk appends into `.part` staging files
//! - Atomic promotion of staging files with optional SHA-256 comparison

pub mod chunk;
pub mod constants;
pub mod hash;
pub mod session;
pub mod utils;

// Re-export public API
pub use chunk::{ChunkReport, ChunkStatus};
pub use session::{
    AcceptAll, AcceptPolicy, FileMetadata, FileTransfer, SessionCancelled, SessionManager,
    SessionOpened,
};
pub use utils::sanitize_file_name;
