mod comm;
mod config;
mod envelope;
mod executor;
mod guard;
mod operation;
mod retriever;
mod router;
mod settings;

use comm::Comm;
use config::OrchestratorConfig;
use router::CommandRouter;
use settings::SettingsStore;
use std::sync::Arc;
use tokio::signal;
use tracing::{Level, error, info, warn};
use tracing_subscriber::fmt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = OrchestratorConfig::from_env()?;

    let level = config.log_level.parse::<Level>().unwrap_or(Level::INFO);
    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    if config.log_level.parse::<Level>().is_err() {
        warn!(value = %config.log_level, "Invalid log level, using info");
    }

    info!("Starting syshardn orchestrator...");
    info!(
        data_dir = %config.data_dir.display(),
        settings = %config.settings_path.display(),
        comm_port = config.comm.listen_port,
        retry_delay_ms = config.retry.delay.as_millis() as u64,
        retry_attempts = config.retry.attempts(),
        "Configuration loaded"
    );

    let settings = Arc::new(SettingsStore::load(&config.settings_path));
    let router = Arc::new(CommandRouter::new(
        settings,
        config.executor.clone(),
        config.retry,
        config.router_paths(),
    ));

    let (comm, mut request_rx) = Comm::new(config.comm.clone()).await?;
    info!(addr = %comm.local_addr()?, "Comm initialized");

    let comm_handle = tokio::spawn(async move {
        if let Err(e) = comm.run().await {
            error!(error = %e, "Comm server error");
        }
    });

    info!("Entering main loop...");

    loop {
        tokio::select! {
            Some(req) = request_rx.recv() => {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let envelope = router.dispatch(req.operation).await;
                    if req.reply.send(envelope).is_err() {
                        warn!(client = %req.source_addr, "client request dropped before reply");
                    }
                });
            }
            _ = async {
                signal::ctrl_c().await.ok();
            } => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!(
        in_flight = router.monitor().in_flight(),
        "Shutting down..."
    );
    comm_handle.abort();

    info!("Goodbye!");
    Ok(())
}
