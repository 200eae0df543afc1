//! Lifecycle hooks for whatever embeds the proxy.

use tracing::{error, info};

/// Notified when the proxy starts and when it has stopped.
///
/// Both methods run on the task that called [`ProxyServer::start`] or
/// [`ProxyHandle::shutdown`] and should return quickly.
///
/// [`ProxyServer::start`]: crate::ProxyServer::start
/// [`ProxyHandle::shutdown`]: crate::ProxyHandle::shutdown
pub trait LifecycleObserver: Send + Sync + 'static {
    /// Called once per start attempt. `failed` is true when the listener
    /// could not be bound.
    fn on_started(&self, failed: bool) {
        let _ = failed;
    }

    /// Called after shutdown has finished.
    fn on_disable(&self) {}
}

/// Writes lifecycle events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl LifecycleObserver for LoggingObserver {
    fn on_started(&self, failed: bool) {
        if failed {
            error!("proxy failed to start");
        } else {
            info!("proxy is up");
        }
    }

    fn on_disable(&self) {
        info!("proxy disabled");
    }
}
