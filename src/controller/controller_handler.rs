use crate::auth::TokenVerifier;
use crate::challenges::{ChallengeCatalog, FsChallengeCatalog};
use crate::cleanup::CleanupLoop;
use crate::configuration::Configuration;
use crate::container_management::{ContainerManager, DockerDriver};
use crate::error_handling::types::ControllerError;
use crate::progress::{DatabaseProgress, ProgressStore};
use crate::session_management::SessionManager;
use crate::terminal_gateway::TerminalGateway;
use crate::validation::ValidationCoordinator;
use crate::web_interface::{ApiContext, WebServer};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Composition root: wires the driver, catalog, managers, gateway and
/// store together and owns the run/shutdown sequence.
pub struct Controller {
    config: Configuration,
    sessions: Arc<SessionManager>,
    containers: Arc<ContainerManager>,
    gateway: Arc<TerminalGateway>,
    validator: Arc<ValidationCoordinator>,
    catalog: Arc<dyn ChallengeCatalog>,
    verifier: TokenVerifier,
}

impl Controller {
    pub async fn new(config: Configuration) -> Result<Self, ControllerError> {
        let driver = DockerDriver::connect()
            .await
            .map_err(ControllerError::Driver)?;

        let catalog: Arc<dyn ChallengeCatalog> = Arc::new(
            FsChallengeCatalog::load(&config.challenges_root).map_err(ControllerError::Catalog)?,
        );

        let containers = Arc::new(ContainerManager::new(
            Arc::new(driver),
            config.container_settings(),
            catalog.clone(),
        ));

        let (close_tx, close_rx) = mpsc::unbounded_channel();
        let sessions = Arc::new(SessionManager::new(config.session_settings(), close_tx));

        let progress: Arc<dyn ProgressStore> = Arc::new(
            DatabaseProgress::connect_file(&config.database_path)
                .await
                .map_err(ControllerError::Progress)?,
        );

        let verifier = TokenVerifier::new(&config.jwt_secret);
        let gateway = Arc::new(TerminalGateway::new(
            sessions.clone(),
            containers.clone(),
            verifier.clone(),
        ));
        tokio::spawn(gateway.clone().run_close_listener(close_rx));

        let validator = Arc::new(ValidationCoordinator::new(
            sessions.clone(),
            containers.clone(),
            progress,
            catalog.clone(),
        ));

        Ok(Self {
            config,
            sessions,
            containers,
            gateway,
            validator,
            catalog,
            verifier,
        })
    }

    /// Serves until the shutdown signal fires, then tears everything
    /// down in order: intake stops, the sweeper stops, terminals are
    /// asked to close, streams get a bounded drain window, remaining
    /// containers are removed best-effort.
    pub async fn run(
        &mut self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), ControllerError> {
        // Building the base image up front keeps the first session
        // start fast; a failure here is retried on that first start.
        if let Err(e) = self.containers.ensure_image().await {
            warn!("base image not ready yet: {}", e);
        }

        let cleanup = CleanupLoop::new(
            self.sessions.clone(),
            self.containers.clone(),
            Duration::from_secs(self.config.cleanup_interval_secs),
        );
        let cleanup_rx = shutdown_rx.resubscribe();
        let cleanup_handle = tokio::spawn(async move { cleanup.run(cleanup_rx).await });

        let web = WebServer::new(ApiContext {
            sessions: self.sessions.clone(),
            containers: self.containers.clone(),
            validator: self.validator.clone(),
            gateway: self.gateway.clone(),
            catalog: self.catalog.clone(),
            verifier: self.verifier.clone(),
        });
        let web_rx = shutdown_rx.resubscribe();
        let bind_address = self.config.bind_address.clone();
        let port = self.config.http_port;
        let web_handle = tokio::spawn(async move {
            if let Err(e) = web.start(&bind_address, port, web_rx).await {
                error!("web server failed: {}", e);
            }
        });

        let _ = shutdown_rx.recv().await;
        info!("controller initiating graceful shutdown");

        if let Err(e) = web_handle.await {
            error!("web server task failed: {:?}", e);
        }
        if let Err(e) = cleanup_handle.await {
            error!("cleanup task failed: {:?}", e);
        }

        self.shutdown().await;
        Ok(())
    }

    /// Final teardown: close terminals, give streams a bounded drain
    /// window, then best-effort remove every remaining container.
    pub async fn shutdown(&mut self) {
        self.gateway.close_all();
        tokio::time::sleep(Duration::from_millis(self.config.shutdown_drain_ms)).await;

        let remaining = self.sessions.list_active();
        if !remaining.is_empty() {
            info!("removing {} remaining container(s)", remaining.len());
        }
        for session in remaining {
            if let Err(e) = self.containers.remove(&session.container_id).await {
                error!(
                    "failed to remove container {} during shutdown: {}",
                    session.container_id, e
                );
            }
            self.sessions.end(session.id);
        }

        info!("controller shutdown completed");
    }
}
