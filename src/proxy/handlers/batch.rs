// Batch match handler
use axum::{
    extract::{rejection::QueryRejection, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::models::{BatchImage, BatchRequest};
use crate::modules::matcher::{BlockReason, Outcome};
use crate::modules::quota;
use crate::proxy::common::error::GatewayError;
use crate::proxy::server::AppState;

const FILE_FIELD: &str = "files";
const DEFAULT_TOP_K: u32 = 3;

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default)]
    pub reference_actor: Option<String>,
}

fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

/// `POST /api/match-actors-batch`
pub async fn handle_match_batch(
    State(state): State<AppState>,
    query: Result<Query<BatchQuery>, QueryRejection>,
    multipart: Multipart,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            return GatewayError::InvalidRequest(rejection.body_text()).into_response();
        }
    };

    let images = match read_images(multipart).await {
        Ok(images) => images,
        Err(e) => return e.into_response(),
    };

    let mut request = BatchRequest::new(images, query.top_k);
    if let Some(reference) = query.reference_actor {
        request = request.with_reference_actor(reference);
    }

    match state.orchestrator.submit(request).await {
        Outcome::Completed {
            response,
            success_count,
            failed_count,
            subscription,
        } => Json(json!({
            "items": response.items,
            "metadata": response.metadata,
            "success_count": success_count,
            "failed_count": failed_count,
            "subscription": quota::snapshot(&subscription),
        }))
        .into_response(),
        Outcome::QuotaBlocked {
            reason,
            subscription,
            upgrade,
        } => {
            let detail = match reason {
                BlockReason::Images => format!(
                    "Monthly image limit reached ({} of {} used)",
                    subscription.used_images, subscription.max_images
                ),
                BlockReason::Actors => format!(
                    "Your plan allows up to {} matches per image",
                    subscription.max_actors
                ),
            };
            (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "reason": reason,
                    "detail": detail,
                    "subscription": quota::snapshot(&subscription),
                    "upgrade": upgrade,
                })),
            )
                .into_response()
        }
        Outcome::Failed { cause } => cause.into_response(),
    }
}

/// Collect every `files` part in upload order
async fn read_images(mut multipart: Multipart) -> Result<Vec<BatchImage>, GatewayError> {
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::InvalidRequest(format!("failed to parse form: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("image_{}", images.len() + 1));
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| GatewayError::InvalidRequest(format!("failed to read {}: {}", filename, e)))?;

        let mut image = BatchImage::new(filename, data);
        if let Some(content_type) = content_type {
            image = image.with_content_type(content_type);
        }
        images.push(image);
    }

    Ok(images)
}
