use log::{error, info, warn};
use shellquest::configuration::Configuration;
use shellquest::controller::Controller;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    // Respect RUST_LOG for the overall level; quiet the noisy layers.
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("sea_orm", log::LevelFilter::Warn)
        .filter_module("sqlx", log::LevelFilter::Warn)
        .filter_module("bollard", log::LevelFilter::Warn)
        .format_target(false)
        .init();

    println!(
        "shellquest v{} - container-backed shell challenges",
        env!("CARGO_PKG_VERSION")
    );

    let config = Configuration::from_args();
    info!(
        "serving challenges from {} on {}:{}",
        config.challenges_root.display(),
        config.bind_address,
        config.http_port
    );

    let mut controller = match Controller::new(config).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("failed to initialize controller: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run(shutdown_rx).await {
            error!("controller error: {}", e);
        }
    });

    info!("shellquest is now operational");

    wait_for_shutdown().await;
    info!("shutdown signal received, stopping");

    if shutdown_tx.send(()).is_err() {
        error!("failed to broadcast shutdown signal");
    }

    match tokio::time::timeout(tokio::time::Duration::from_secs(10), controller_handle).await {
        Ok(Ok(())) => info!("shellquest shutdown completed"),
        Ok(Err(e)) => error!("controller task failed during shutdown: {:?}", e),
        Err(_) => warn!("controller shutdown timed out after 10 seconds"),
    }
}

/// Waits for SIGINT or, where available, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            error!("failed to listen for SIGINT: {}", e);
                        }
                    }
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("failed to listen for SIGINT: {}", e);
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", e);
        }
    }
}
