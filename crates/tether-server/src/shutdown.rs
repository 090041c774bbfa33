//! Shutdown: stop accepting upgrades, close every connection and wait for
//! each one to finish its teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Tracks live connection tasks and drains them on shutdown.
///
/// Every upgraded socket holds a [`TaskTrackerToken`] from
/// [`ShutdownCoordinator::connection_guard`] until its teardown (cleanup hook
/// included) has finished, so [`ShutdownCoordinator::graceful_shutdown`] only
/// returns once no connection is mid-teardown.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    connections: TaskTracker,
    registry: Arc<ConnectionRegistry>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            token: CancellationToken::new(),
            connections: TaskTracker::new(),
            registry,
        }
    }

    /// Cancelled once shutdown starts.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Guard for a new connection, or `None` once shutdown has started.
    pub fn connection_guard(&self) -> Option<TaskTrackerToken> {
        if self.is_shutting_down() {
            return None;
        }
        Some(self.connections.token())
    }

    /// Connections that have not finished teardown yet.
    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    /// Start shutdown: refuse new upgrades and close every registered
    /// channel. Idempotent.
    pub fn shutdown(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        info!(connections = self.registry.count(), "shutting down, closing connections");
        self.registry.close_all();
    }

    /// Shut down, then wait up to `timeout` for the HTTP server task and for
    /// every connection's teardown.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn graceful_shutdown(
        &self,
        server: JoinHandle<()>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        self.connections.close();

        let drain = async {
            if let Err(e) = server.await {
                warn!(error = %e, "server task ended abnormally");
            }
            self.connections.wait().await;
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => {
                info!("all connections drained");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.active_connections(),
                    "shutdown timed out after {timeout:?}, connections still tearing down"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use tether_core::ClientId;

    fn coordinator() -> (ShutdownCoordinator, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        (ShutdownCoordinator::new(Arc::clone(&registry)), registry)
    }

    #[test]
    fn shutdown_closes_registered_channels() {
        let (coord, registry) = coordinator();
        let (channel, _rx) = Channel::new(4);
        registry.insert(ClientId::new(), Arc::clone(&channel));
        let token = coord.token();

        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(token.is_cancelled());
        assert!(channel.is_closed());
    }

    #[test]
    fn no_guard_after_shutdown() {
        let (coord, _registry) = coordinator();
        let guard = coord.connection_guard();
        assert!(guard.is_some());
        assert_eq!(coord.active_connections(), 1);

        coord.shutdown();
        assert!(coord.connection_guard().is_none());
        drop(guard);
        assert_eq!(coord.active_connections(), 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_teardown() {
        let (coord, registry) = coordinator();
        let (channel, _rx) = Channel::new(4);
        let id = ClientId::from_raw("slow-teardown");
        registry.insert(id.clone(), Arc::clone(&channel));

        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let guard = coord.connection_guard().unwrap();
        let teardown = {
            let registry = Arc::clone(&registry);
            let finished = Arc::clone(&finished);
            async move {
                channel.closed_token().cancelled().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                let _ = registry.remove_if_same(&id, &channel);
                finished.store(true, std::sync::atomic::Ordering::SeqCst);
                drop(guard);
            }
        };
        drop(tokio::spawn(teardown));

        let server = tokio::spawn(async {});
        assert!(coord.graceful_shutdown(server, None).await);
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(registry.count(), 0);
        assert_eq!(coord.active_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_shutdown_gives_up_after_timeout() {
        let (coord, _registry) = coordinator();
        let _guard = coord.connection_guard().unwrap();

        let started = tokio::time::Instant::now();
        let drained = coord
            .graceful_shutdown(tokio::spawn(async {}), Some(Duration::from_millis(200)))
            .await;
        assert!(!drained);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
