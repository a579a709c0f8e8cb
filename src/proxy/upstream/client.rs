// Match gateway: forwards one batch to the matching backend

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde_json::Value;
use tokio::time::Duration;
use url::Url;

use crate::models::{BatchRequest, BatchResponse};
use crate::proxy::common::error::GatewayError;
use crate::proxy::config::ProxyConfig;
use crate::proxy::mappers::batch::{reshape, RawBatchResponse};
use crate::proxy::media::ImageProcessor;

const BATCH_PATH: &str = "match-actors-batch";
const HEALTH_PATH: &str = "health";
const FILE_FIELD: &str = "files";

/// Something that can match a batch. Implemented by [`MatchGateway`]; the
/// orchestrator depends only on this seam.
#[async_trait]
pub trait MatchBackend: Send + Sync {
    async fn match_batch(&self, request: &BatchRequest) -> Result<BatchResponse, GatewayError>;
}

pub struct MatchGateway {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

impl MatchGateway {
    pub fn new(config: &ProxyConfig) -> Result<Self, GatewayError> {
        let base_url = Self::validate_base_url(config.backend_base())?;
        let timeout = config.backend_timeout().ok_or_else(|| {
            GatewayError::Configuration(format!(
                "timeout margin {}s leaves no time under host limit {}s",
                config.timeout_margin_secs, config.host_time_limit_secs
            ))
        })?;

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(timeout);

        let upstream = &config.upstream_proxy;
        if upstream.enabled && !upstream.url.is_empty() {
            match reqwest::Proxy::all(&upstream.url) {
                Ok(proxy) => {
                    builder = builder.proxy(proxy);
                    tracing::info!("MatchGateway enabled upstream proxy: {}", upstream.url);
                }
                Err(e) => {
                    tracing::error!("Invalid upstream proxy {}: {}", upstream.url, e);
                }
            }
        }

        let http_client = builder
            .build()
            .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            timeout,
        })
    }

    /// Backend address must be set and be an absolute http(s) URL
    fn validate_base_url(raw: Option<&str>) -> Result<String, GatewayError> {
        let raw = raw.ok_or_else(|| {
            GatewayError::Configuration("BACKEND_URL not set".to_string())
        })?;
        let parsed = Url::parse(raw)
            .map_err(|e| GatewayError::Configuration(format!("invalid backend address {}: {}", raw, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(GatewayError::Configuration(format!(
                "backend address must be http(s): {}",
                raw
            )));
        }
        Ok(raw.trim_end_matches('/').to_string())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_url(base_url: &str, path: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    }

    fn build_form(request: &BatchRequest) -> Result<multipart::Form, GatewayError> {
        let mut form = multipart::Form::new();
        for image in &request.images {
            let mime = ImageProcessor::resolve_mime_type(
                &image.filename,
                image.content_type.as_deref(),
                &image.data,
            );
            let part = multipart::Part::stream_with_length(image.data.clone(), image.data.len() as u64)
                .file_name(image.filename.clone())
                .mime_str(&mime)
                .map_err(|e| GatewayError::InvalidRequest(format!("{}: {}", image.filename, e)))?;
            form = form.part(FILE_FIELD, part);
        }
        Ok(form)
    }

    fn query_params(request: &BatchRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![("top_k", request.top_k.to_string())];
        if let Some(reference) = &request.reference_actor {
            params.push(("reference_actor", reference.clone()));
        }
        params
    }

    /// Send and read the whole response under one deadline
    async fn send_batch(&self, request: &BatchRequest) -> Result<(u16, String), GatewayError> {
        let url = Self::build_url(&self.base_url, BATCH_PATH);
        let form = Self::build_form(request)?;

        let call = async {
            let resp = self
                .http_client
                .post(&url)
                .query(&Self::query_params(request))
                .multipart(form)
                .send()
                .await?;
            let status = resp.status().as_u16();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(GatewayError::Timeout { after: self.timeout }),
            Ok(Err(e)) if e.is_timeout() => Err(GatewayError::Timeout { after: self.timeout }),
            Ok(Err(e)) => Err(GatewayError::from(e)),
            Ok(Ok(pair)) => Ok(pair),
        }
    }

    /// Backend liveness probe: `GET {backend}/health`
    pub async fn health(&self) -> Result<Value, GatewayError> {
        let url = Self::build_url(&self.base_url, HEALTH_PATH);
        let resp = self
            .http_client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl MatchBackend for MatchGateway {
    async fn match_batch(&self, request: &BatchRequest) -> Result<BatchResponse, GatewayError> {
        if request.is_empty() {
            return Err(GatewayError::InvalidRequest("no image files uploaded".to_string()));
        }
        if request.top_k == 0 {
            return Err(GatewayError::InvalidRequest("top_k must be at least 1".to_string()));
        }

        tracing::debug!(
            "Forwarding batch | Images: {} | top_k: {} | Reference: {:?}",
            request.len(),
            request.top_k,
            request.reference_actor
        );

        let (status, body) = self.send_batch(request).await?;
        if !(200..300).contains(&status) {
            tracing::warn!("Backend returned {} for batch of {}", status, request.len());
            return Err(GatewayError::Backend { status, body });
        }

        let raw: RawBatchResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let filenames: Vec<String> = request.images.iter().map(|i| i.filename.clone()).collect();

        Ok(reshape(
            raw,
            &filenames,
            request.reference_actor.as_deref(),
            &self.base_url,
        ))
    }
}

/// Stands in for the gateway when the backend address is unusable, so the
/// service still starts and every batch reports the configuration error.
pub struct UnconfiguredBackend {
    reason: String,
}

impl UnconfiguredBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl MatchBackend for UnconfiguredBackend {
    async fn match_batch(&self, _request: &BatchRequest) -> Result<BatchResponse, GatewayError> {
        Err(GatewayError::Configuration(self.reason.clone()))
    }
}
