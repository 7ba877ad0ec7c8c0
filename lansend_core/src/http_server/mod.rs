//! HTTPS transport for the receiver.
//!
//! Maps the LanSend wire protocol onto [`crate::state::ReceiverState`]:
//! - `POST /connect`, `POST /request-send`, `POST /cancel-send`
//! - `POST /api/v1/file_data/{file_id}` (alias `/file_data/{file_id}`)
//! - `GET /ping`

pub mod handlers;
pub mod server;
pub mod tls;

pub use server::{create_router, spawn_https_server};
pub use tls::{TlsSettings, install_crypto_provider, load_tls_config};
