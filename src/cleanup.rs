//! Periodic reclamation of expired sessions and their containers.

use crate::container_management::ContainerManager;
use crate::session_management::SessionManager;
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Periodic task evicting expired sessions.
///
/// Runs one sweep immediately on start, then once per interval. A
/// failing container removal is logged and the session is still marked
/// expired so the next tick does not retry it forever.
pub struct CleanupLoop {
    sessions: Arc<SessionManager>,
    containers: Arc<ContainerManager>,
    interval: Duration,
}

impl CleanupLoop {
    pub fn new(
        sessions: Arc<SessionManager>,
        containers: Arc<ContainerManager>,
        interval: Duration,
    ) -> Self {
        Self {
            sessions,
            containers,
            interval,
        }
    }

    /// Runs until the shutdown signal fires. An in-flight sweep is
    /// allowed to finish.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("cleanup loop started (interval {:?})", self.interval);
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("cleanup loop stopping");
                    break;
                }
            }
        }
    }

    /// One pass: evicts every currently-expired session.
    pub async fn sweep(&self) -> usize {
        let expired = self.sessions.list_expired();
        if expired.is_empty() {
            debug!("cleanup sweep: nothing expired");
            return 0;
        }

        info!("cleanup sweep: {} expired session(s)", expired.len());
        let count = expired.len();
        for session in expired {
            if let Err(e) = self.containers.remove(&session.container_id).await {
                error!(
                    "failed to remove container {} for expired session {}: {}",
                    session.container_id, session.id, e
                );
            }
            self.sessions.mark_expired(session.id);
        }
        count
    }
}
