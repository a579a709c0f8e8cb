use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gateway server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Allow LAN access
    /// - false: bind 127.0.0.1 only (default)
    /// - true: bind 0.0.0.0
    #[serde(default)]
    pub allow_lan_access: bool,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Matching backend base address, e.g. `https://api.example.com`
    #[serde(default)]
    pub backend_url: Option<String>,

    /// Hard execution ceiling of the hosting platform (seconds)
    #[serde(default = "default_host_time_limit")]
    pub host_time_limit_secs: u64,

    /// How much earlier than the host ceiling the backend call gives up (seconds)
    #[serde(default = "default_timeout_margin")]
    pub timeout_margin_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Request body limit (MB)
    #[serde(default = "default_max_body_mb")]
    pub max_body_mb: usize,

    #[serde(default)]
    pub upstream_proxy: UpstreamProxyConfig,
}

/// Outbound proxy for backend calls
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpstreamProxyConfig {
    pub enabled: bool,
    /// Proxy address (http://, https://, socks5://)
    pub url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            allow_lan_access: false,
            port: default_port(),
            backend_url: None,
            host_time_limit_secs: default_host_time_limit(),
            timeout_margin_secs: default_timeout_margin(),
            connect_timeout_secs: default_connect_timeout(),
            max_body_mb: default_max_body_mb(),
            upstream_proxy: UpstreamProxyConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    8046
}

fn default_host_time_limit() -> u64 {
    900
}

fn default_timeout_margin() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    20
}

fn default_max_body_mb() -> usize {
    100
}

impl ProxyConfig {
    pub fn get_bind_address(&self) -> &str {
        if self.allow_lan_access {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }

    /// Deadline for one backend call: host ceiling minus margin.
    /// `None` when the margin leaves no time at all.
    pub fn backend_timeout(&self) -> Option<Duration> {
        self.host_time_limit_secs
            .checked_sub(self.timeout_margin_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Configured backend address with surrounding whitespace removed; blank reads as unset.
    pub fn backend_base(&self) -> Option<&str> {
        self.backend_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_leaves_margin_under_host_ceiling() {
        let config = ProxyConfig::default();
        assert_eq!(config.backend_timeout(), Some(Duration::from_secs(895)));
    }

    #[test]
    fn test_margin_consuming_whole_ceiling_is_rejected() {
        let config = ProxyConfig {
            host_time_limit_secs: 5,
            timeout_margin_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.backend_timeout(), None);

        let config = ProxyConfig {
            host_time_limit_secs: 3,
            timeout_margin_secs: 5,
            ..Default::default()
        };
        assert_eq!(config.backend_timeout(), None);
    }

    #[test]
    fn test_blank_backend_reads_as_unset() {
        let config = ProxyConfig {
            backend_url: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.backend_base(), None);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ProxyConfig =
            serde_json::from_str(r#"{"backend_url":"https://api.example.com"}"#).unwrap();
        assert_eq!(config.port, 8046);
        assert_eq!(config.backend_base(), Some("https://api.example.com"));
        assert_eq!(config.get_bind_address(), "127.0.0.1");
    }
}
