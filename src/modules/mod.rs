pub mod config;
pub mod logger;
pub mod matcher;
pub mod quota;
pub mod store;

pub use config::load_app_config;
pub use matcher::{BatchOrchestrator, BlockReason, Outcome};
pub use store::{JsonFileStore, MemoryStore, QuotaStore};
