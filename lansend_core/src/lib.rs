use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod discovery;
pub mod error;
pub mod http_server;
pub mod identity;
pub mod pairing;
pub mod state;
pub mod transfer;

pub use config::AppConfig;
pub use error::TransferError;
pub use identity::DeviceInfo;
pub use state::ReceiverState;

use discovery::{Broadcaster, DiscoveryService};
use http_server::TlsSettings;

/// Grace period given to in-flight requests on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A receiver that is announcing itself and accepting connections
pub struct RunningReceiver {
    state: Arc<ReceiverState>,
    local_addr: SocketAddr,
    server_handle: axum_server::Handle,
    server_task: JoinHandle<std::io::Result<()>>,
    broadcaster: Broadcaster,
}

impl RunningReceiver {
    /// Bring up TLS, the HTTPS listener and the broadcaster, in that order.
    ///
    /// Any failure here is fatal: nothing keeps running if this returns `Err`.
    pub async fn start(config: &AppConfig, tls: &TlsSettings) -> Result<Self> {
        http_server::install_crypto_provider();

        let device = DeviceInfo::local(config);
        tracing::info!(
            "Device: {} ({}) at {}:{}",
            device.alias,
            device.device_id,
            device.ip_address,
            device.port
        );

        let tls_config =
            http_server::load_tls_config(tls, &[device.ip_address.clone(), device.hostname.clone()])
                .await?;

        if let Err(e) = tokio::fs::create_dir_all(&config.output_dir).await {
            // Retried when a session opens
            tracing::error!(
                "Cannot create output directory {:?}: {}",
                config.output_dir,
                e
            );
        }

        let state = Arc::new(ReceiverState::new(
            device.clone(),
            config.pin.clone(),
            config.output_dir.clone(),
        ));
        let router = http_server::create_router(state.clone(), config.max_body_bytes);

        let server_handle = axum_server::Handle::new();
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let (local_addr, server_task) =
            http_server::spawn_https_server(addr, router, tls_config, server_handle.clone())?;

        let discovery = match DiscoveryService::new(config.broadcast_port).await {
            Ok(ds) => ds,
            Err(e) => {
                server_handle.shutdown();
                return Err(e).with_context(|| {
                    format!("Cannot bind broadcast socket for port {}", config.broadcast_port)
                });
            }
        };
        let broadcaster = discovery.start_broadcasting(
            device,
            config.broadcast_interval(),
            CancellationToken::new(),
        );

        Ok(Self {
            state,
            local_addr,
            server_handle,
            server_task,
            broadcaster,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> &Arc<ReceiverState> {
        &self.state
    }

    /// Run until `shutdown` fires or the server stops on its own
    pub async fn run_until(mut self, shutdown: CancellationToken) -> Result<()> {
        let served = tokio::select! {
            _ = shutdown.cancelled() => None,
            res = &mut self.server_task => Some(res),
        };

        match served {
            None => self.stop().await,
            Some(res) => {
                self.broadcaster.shutdown().await;
                res.context("HTTPS server task panicked")?
                    .context("HTTPS server stopped")
            }
        }
    }

    /// Stop accepting connections, let in-flight requests finish, then stop
    /// broadcasting.
    pub async fn stop(self) -> Result<()> {
        tracing::info!("Shutting down receiver...");
        self.server_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        let served = self.server_task.await;

        if !self.broadcaster.shutdown().await {
            tracing::warn!("Broadcast task was still running at exit");
        }

        served
            .context("HTTPS server task panicked")?
            .context("HTTPS server failed")?;
        tracing::info!("Receiver stopped");
        Ok(())
    }
}

/// Start a receiver from `config` and run it until `shutdown` fires
pub async fn run_receiver(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    let tls = TlsSettings::from_config(&config);
    let receiver = RunningReceiver::start(&config, &tls).await?;
    tracing::info!(
        "LanSend receiver ready on port {} (PIN required for pairing)",
        receiver.local_addr().port()
    );
    receiver.run_until(shutdown).await
}
