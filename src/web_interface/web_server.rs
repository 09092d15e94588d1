use crate::error_handling::types::WebError;
use crate::web_interface::routes::{self, ApiContext};
use log::info;
use std::net::{IpAddr, SocketAddr};
use tokio::sync::broadcast;

/// Binds the session surface and serves it until shutdown.
pub struct WebServer {
    ctx: ApiContext,
}

impl WebServer {
    pub fn new(ctx: ApiContext) -> Self {
        Self { ctx }
    }

    /// Serves until the shutdown signal fires; in-flight requests are
    /// allowed to finish, new connections are refused.
    pub async fn start(
        &self,
        bind_address: &str,
        port: u16,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), WebError> {
        let ip: IpAddr = bind_address
            .parse()
            .map_err(|_| WebError::InvalidBindAddress(bind_address.to_string()))?;
        let addr = SocketAddr::new(ip, port);

        let api = routes::routes(self.ctx.clone());
        let (bound, serving) = warp::serve(api).bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_rx.recv().await;
        });

        info!("web interface listening on {}", bound);
        serving.await;
        info!("web interface stopped");
        Ok(())
    }
}
