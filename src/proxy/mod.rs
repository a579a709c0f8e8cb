// Gateway service module
pub mod common;
pub mod config;
pub mod handlers;
pub mod mappers;
pub mod media;
pub mod middleware;
pub mod server;
pub mod upstream;

pub use config::ProxyConfig;
pub use server::{AppState, AxumServer};
pub use upstream::client::{MatchBackend, MatchGateway};
