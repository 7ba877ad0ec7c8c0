//! Periodic UDP broadcast of this device's identity.

use crate::identity::DeviceInfo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Limited broadcast address used by LanSend peers
pub const BROADCAST_ADDR: [u8; 4] = [255, 255, 255, 255];

pub struct DiscoveryService {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

impl DiscoveryService {
    /// Bind an ephemeral socket that broadcasts to `255.255.255.255:<broadcast_port>`
    pub async fn new(broadcast_port: u16) -> Result<Self, std::io::Error> {
        Self::with_target(SocketAddr::from((BROADCAST_ADDR, broadcast_port))).await
    }

    /// Bind an ephemeral socket that sends to an arbitrary target
    pub async fn with_target(target: SocketAddr) -> Result<Self, std::io::Error> {
        let addr = SocketAddr::from(([0, 0, 0, 0], 0));
        let socket = UdpSocket::bind(addr).await?;

        // Enable broadcast
        socket.set_broadcast(true)?;

        Ok(Self {
            socket: Arc::new(socket),
            target,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one announcement. Best-effort: failures are logged, never returned.
    pub async fn announce(&self, info: &DeviceInfo) {
        match serde_json::to_vec(info) {
            Ok(json_bytes) => match self.socket.send_to(&json_bytes, self.target).await {
                Ok(_) => tracing::debug!("Broadcasted device info: {}", info.alias),
                Err(e) => tracing::error!("Error during UDP broadcast: {}", e),
            },
            Err(e) => tracing::error!("Cannot serialize device info: {}", e),
        }
    }

    /// Start the broadcast loop. It announces immediately, then once per
    /// `interval`, and exits as soon as `cancel` fires.
    pub fn start_broadcasting(
        self,
        info: DeviceInfo,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Broadcaster {
        tracing::info!(
            "Starting UDP broadcast to {} every {}s for device: {}",
            self.target,
            interval.as_secs_f64(),
            info.alias
        );

        let loop_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = ticker.tick() => self.announce(&info).await,
                }
            }
            tracing::info!("UDP broadcast task stopped.");
        });

        Broadcaster {
            cancel,
            handle,
            interval,
        }
    }
}

/// Handle to a running broadcast loop
pub struct Broadcaster {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl Broadcaster {
    /// Signal the loop to stop and wait for it, bounded by one interval plus a second.
    /// Returns `false` if the task did not finish in time.
    pub async fn shutdown(self) -> bool {
        self.cancel.cancel();
        let bound = self.interval + Duration::from_secs(1);
        match tokio::time::timeout(bound, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!("Broadcast task failed: {}", e);
                true
            }
            Err(_) => {
                tracing::warn!("Broadcast task did not stop within {:?}", bound);
                false
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
