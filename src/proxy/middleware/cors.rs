// CORS for the browser front end
use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// Any origin may call the gateway; only the methods the routes use are allowed
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(std::time::Duration::from_secs(3600))
}
