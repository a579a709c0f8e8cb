use std::fs;

use crate::error::{AppError, AppResult};
use crate::models::AppConfig;
use super::store::get_data_dir;

const CONFIG_FILE: &str = "config.json";

const ENV_BACKEND_URL: &str = "BACKEND_URL";
const ENV_PORT: &str = "GENIE_PORT";
const ENV_ALLOW_LAN: &str = "GENIE_ALLOW_LAN";

/// Load `<data dir>/config.json` (defaults when absent), then apply environment overrides
pub fn load_app_config() -> AppResult<AppConfig> {
    let data_dir = get_data_dir()?;
    let config_path = data_dir.join(CONFIG_FILE);

    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Config(format!("failed to parse {}: {}", config_path.display(), e))
        })?
    } else {
        AppConfig::new()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Environment values win over the file. `lookup` is injected so tests need not touch the process env.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_BACKEND_URL).filter(|v| !v.trim().is_empty()) {
        config.proxy.backend_url = Some(url.trim().to_string());
    }

    if let Some(port) = lookup(ENV_PORT).filter(|v| !v.trim().is_empty()) {
        config.proxy.port = port
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{}={} is not a port: {}", ENV_PORT, port, e)))?;
    }

    if let Some(flag) = lookup(ENV_ALLOW_LAN) {
        config.proxy.allow_lan_access = matches!(flag.trim(), "1" | "true" | "yes");
    }

    Ok(())
}
