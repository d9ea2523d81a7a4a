use std::time::Duration;

use tokio::net::TcpStream;

/// Network reachability and metered-connection state.
///
/// §9 calls out the source's network-monitor singleton as something to
/// re-architect into an explicitly injected, process-wide service rather
/// than a globally discovered one. `NetworkMonitor` is that seam: the
/// Orchestrator takes one by value (or `Arc`) at construction instead of
/// reaching for a global.
pub trait NetworkMonitor: Send + Sync {
    /// Best-effort reachability check. Returns `false` only when the engine
    /// is confident there is no usable network path, not merely slow.
    async fn is_connected(&self) -> bool;

    /// `true` if the active connection is metered/expensive (cellular) and
    /// therefore requires consent before large transfers proceed (§4.4).
    fn is_metered(&self) -> bool;
}

/// Reachability probe used outside test doubles: attempts a short TCP
/// handshake to a small, stable set of well-known hosts. A desktop/server
/// deployment has no OS-level metered-connection API to query, so `is_metered`
/// conservatively reports `false` — consent is only ever required when a
/// caller supplies a monitor that can actually detect cellular connections.
pub struct SystemNetworkMonitor {
    probe_timeout: Duration,
}

impl SystemNetworkMonitor {
    pub fn new() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl Default for SystemNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

const PROBE_TARGETS: &[&str] = &["1.1.1.1:443", "8.8.8.8:443"];

impl NetworkMonitor for SystemNetworkMonitor {
    async fn is_connected(&self) -> bool {
        for target in PROBE_TARGETS {
            let attempt = tokio::time::timeout(self.probe_timeout, TcpStream::connect(target));
            if matches!(attempt.await, Ok(Ok(_))) {
                return true;
            }
        }
        false
    }

    fn is_metered(&self) -> bool {
        false
    }
}
