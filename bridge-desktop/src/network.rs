//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const DEFAULT_PROBE_ADDR: &str = "1.1.1.1:443";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_TTL: Duration = Duration::from_secs(30);

/// Desktop network monitor implementation
///
/// Connectivity is detected with a short TCP probe and cached for a few
/// seconds. Desktops cannot tell a tethered phone from a wired link, so the
/// metered flag is whatever the host last reported through
/// [`set_metered`](Self::set_metered).
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    metered: AtomicBool,
    cached: Mutex<Option<(Instant, NetworkStatus)>>,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self::with_probe_addr(DEFAULT_PROBE_ADDR)
    }

    pub fn with_probe_addr(addr: impl Into<String>) -> Self {
        Self {
            probe_addr: addr.into(),
            metered: AtomicBool::new(false),
            cached: Mutex::new(None),
        }
    }

    /// Mark the current connection as metered (or not).
    pub fn set_metered(&self, metered: bool) {
        self.metered.store(metered, Ordering::SeqCst);
    }

    async fn probe(&self) -> NetworkStatus {
        match tokio::time::timeout(
            PROBE_TIMEOUT,
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }

    async fn status(&self) -> NetworkStatus {
        let mut cached = self.cached.lock().await;
        if let Some((at, status)) = *cached {
            if at.elapsed() < CACHE_TTL {
                return status;
            }
        }

        let status = self.probe().await;
        *cached = Some((Instant::now(), status));
        debug!(status = ?status, probe = %self.probe_addr, "Network status refreshed");
        status
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.status().await;
        let info = match status {
            NetworkStatus::Connected => {
                NetworkInfo::connected(NetworkType::Other, self.metered.load(Ordering::SeqCst))
            }
            _ => NetworkInfo::disconnected(),
        };
        Ok(info)
    }
}
