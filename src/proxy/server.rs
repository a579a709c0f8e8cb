use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::modules::matcher::BatchOrchestrator;
use crate::proxy::handlers;
use crate::proxy::upstream::client::MatchGateway;

/// Axum application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BatchOrchestrator>,
    /// `None` when the backend address is missing or invalid
    pub gateway: Option<Arc<MatchGateway>>,
}

/// All routes with their layers; `max_body_mb` caps a whole multipart upload
pub fn build_router(state: AppState, max_body_mb: usize) -> Router {
    Router::new()
        .route(
            "/api/match-actors-batch",
            post(handlers::batch::handle_match_batch),
        )
        .route(
            "/api/subscription",
            get(handlers::subscription::handle_get_subscription),
        )
        .route(
            "/api/subscription/upgrade",
            post(handlers::subscription::handle_upgrade),
        )
        .route(
            "/api/subscription/downgrade",
            post(handlers::subscription::handle_downgrade),
        )
        .route(
            "/api/backend/health",
            get(handlers::health::handle_backend_health),
        )
        .route("/healthz", get(handlers::health::handle_liveness))
        .layer(DefaultBodyLimit::max(max_body_mb.saturating_mul(1024 * 1024)))
        .layer(TraceLayer::new_for_http())
        .layer(crate::proxy::middleware::cors_layer())
        .with_state(state)
}

/// Running gateway server
pub struct AxumServer {
    shutdown_tx: Option<oneshot::Sender<()>>,
    local_addr: std::net::SocketAddr,
}

impl AxumServer {
    pub async fn start(
        host: String,
        port: u16,
        state: AppState,
        max_body_mb: usize,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), String> {
        let app = build_router(state, max_body_mb);

        let addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("failed to bind {}: {}", addr, e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("failed to read bound address: {}", e))?;

        tracing::info!("Match gateway listening on http://{}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;

            loop {
                tokio::select! {
                    res = listener.accept() => {
                        match res {
                            Ok((stream, _)) => {
                                let io = TokioIo::new(stream);
                                let service = TowerToHyperService::new(app.clone());

                                tokio::task::spawn(async move {
                                    if let Err(err) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection closed: {:?}", err);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Failed to accept connection: {:?}", e);
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::info!("Match gateway stopped listening");
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                shutdown_tx: Some(shutdown_tx),
                local_addr,
            },
            handle,
        ))
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Stop accepting; in-flight connections finish on their own tasks
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
