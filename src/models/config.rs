use serde::{Deserialize, Serialize};
use crate::proxy::ProxyConfig;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Also write logs to `<data dir>/logs`
    #[serde(default = "default_true")]
    pub log_to_file: bool,
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            proxy: ProxyConfig::default(),
            log_to_file: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}
