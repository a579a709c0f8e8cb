pub mod error;
pub mod models;
pub mod modules;
pub mod proxy;

use std::sync::Arc;

use error::{AppError, AppResult};
use modules::logger;
use modules::matcher::BatchOrchestrator;
use modules::store::{JsonFileStore, QuotaStore};
use proxy::upstream::client::{MatchBackend, MatchGateway, UnconfiguredBackend};
use proxy::{AppState, AxumServer};

/// Load config, wire store, gateway and orchestrator, serve until Ctrl-C
pub async fn run() -> AppResult<()> {
    let config = modules::load_app_config()?;
    logger::init_logger(config.log_to_file);

    let store: Arc<dyn QuotaStore> = Arc::new(JsonFileStore::in_data_dir()?);

    let proxy_config = &config.proxy;
    let (gateway, backend): (Option<Arc<MatchGateway>>, Arc<dyn MatchBackend>) =
        match MatchGateway::new(proxy_config) {
            Ok(gateway) => {
                tracing::info!(
                    "Backend: {} | timeout: {}s",
                    gateway.base_url(),
                    gateway.timeout().as_secs()
                );
                let gateway = Arc::new(gateway);
                (Some(gateway.clone()), gateway)
            }
            Err(e) => {
                // Subscription routes still work; batches report the error
                logger::log_error(&format!("Match backend unavailable: {}", e));
                (None, Arc::new(UnconfiguredBackend::new(e.to_string())))
            }
        };

    let state = AppState {
        orchestrator: Arc::new(BatchOrchestrator::new(store, backend)),
        gateway,
    };

    let (server, handle) = AxumServer::start(
        proxy_config.get_bind_address().to_string(),
        proxy_config.port,
        state,
        proxy_config.max_body_mb,
    )
    .await
    .map_err(AppError::Server)?;

    tokio::signal::ctrl_c().await?;
    logger::log_info("Shutdown requested");
    server.stop();
    if let Err(e) = handle.await {
        logger::log_warn(&format!("Server task ended abnormally: {}", e));
    }
    Ok(())
}
