//! Reshapes the backend's batch payload into a [`BatchResponse`].
//!
//! The backend signals its mode through which optional fields an item
//! carries. That inference happens here, once; everything downstream works
//! with [`MatchOutcome`].

use serde::Deserialize;

use crate::models::{
    ActorMatch, BatchItemResult, BatchMetadata, BatchResponse, MatchMode, MatchOutcome,
    ReferenceRank,
};

/// Cause recorded for inputs the backend left out of its item list
pub const OMITTED_CAUSE: &str = "not returned by backend";

#[derive(Debug, Deserialize, Default)]
pub struct RawBatchResponse {
    #[serde(default)]
    pub items: Vec<RawItem>,
    #[serde(default)]
    pub ranked_by_reference: Vec<RawReferenceRank>,
    #[serde(default)]
    pub reference_actor: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawItem {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<RawMatch>>,
    #[serde(default)]
    pub reference_score: Option<f64>,
    #[serde(default)]
    pub reference_actor_name: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawMatch {
    #[serde(alias = "actor_name")]
    pub name: String,
    #[serde(alias = "similarity")]
    pub score: f64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_reference: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawReferenceRank {
    pub filename: String,
    pub reference_score: f64,
}

/// Prefix backend-relative media paths with the backend base address.
/// Absolute `http(s)` URLs are returned untouched.
pub fn normalize_media_url(base_url: &str, url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return url.to_string();
    }

    let base = base_url.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{}{}", base, url)
    } else {
        format!("{}/{}", base, url)
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Decide one item's outcome.
///
/// Reference mode needs both a requested reference actor and a
/// backend-resolved score; otherwise the item falls back to ranked mode.
pub fn classify_item(item: RawItem, reference_actor: Option<&str>, base_url: &str) -> MatchOutcome {
    if let Some(cause) = item.error {
        return MatchOutcome::Errored { cause };
    }

    if let (Some(requested), Some(score)) = (reference_actor, item.reference_score) {
        let actor_name = item
            .reference_actor_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| requested.to_string());
        return MatchOutcome::Reference {
            score: clamp_score(score),
            actor_name,
        };
    }

    let results = item
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|m| ActorMatch {
            name: m.name,
            score: clamp_score(m.score),
            image_url: m
                .image_url
                .filter(|u| !u.is_empty())
                .map(|u| normalize_media_url(base_url, &u)),
            is_reference: m.is_reference,
        })
        .collect();

    MatchOutcome::Ranked { results }
}

/// Align backend items with the submitted filenames.
///
/// Same length with matching filenames aligns by position; otherwise each
/// input takes the first unused item with its filename. Inputs left without
/// an item map to `None`.
fn align(filenames: &[String], items: Vec<RawItem>) -> Vec<Option<RawItem>> {
    let positional = items.len() == filenames.len()
        && items
            .iter()
            .zip(filenames)
            .all(|(item, name)| item.filename.as_deref().map_or(true, |f| f == name));

    if positional {
        return items.into_iter().map(Some).collect();
    }

    let mut pool: Vec<Option<RawItem>> = items.into_iter().map(Some).collect();
    filenames
        .iter()
        .map(|name| {
            pool.iter_mut()
                .find(|slot| {
                    slot.as_ref()
                        .and_then(|item| item.filename.as_deref())
                        .map_or(false, |f| f == name)
                })
                .and_then(Option::take)
        })
        .collect()
}

/// Build the caller-facing response, one item per submitted file in submission order
pub fn reshape(
    raw: RawBatchResponse,
    filenames: &[String],
    reference_actor: Option<&str>,
    base_url: &str,
) -> BatchResponse {
    let items: Vec<BatchItemResult> = align(filenames, raw.items)
        .into_iter()
        .zip(filenames)
        .map(|(slot, filename)| {
            let outcome = match slot {
                Some(item) => classify_item(item, reference_actor, base_url),
                None => MatchOutcome::Errored {
                    cause: OMITTED_CAUSE.to_string(),
                },
            };
            BatchItemResult {
                filename: filename.clone(),
                outcome,
            }
        })
        .collect();

    let resolved_name = items.iter().find_map(|item| match &item.outcome {
        MatchOutcome::Reference { actor_name, .. } => Some(actor_name.clone()),
        _ => None,
    });

    let metadata = match resolved_name {
        Some(name) => {
            let mut ranking: Vec<ReferenceRank> = raw
                .ranked_by_reference
                .into_iter()
                .map(|r| ReferenceRank {
                    filename: r.filename,
                    score: clamp_score(r.reference_score),
                })
                .collect();
            if ranking.is_empty() {
                ranking = items
                    .iter()
                    .filter_map(|item| match &item.outcome {
                        MatchOutcome::Reference { score, .. } => Some(ReferenceRank {
                            filename: item.filename.clone(),
                            score: *score,
                        }),
                        _ => None,
                    })
                    .collect();
            }
            ranking.sort_by(|a, b| b.score.total_cmp(&a.score));

            BatchMetadata {
                mode: MatchMode::Reference,
                reference_actor: Some(name),
                reference_ranking: ranking,
            }
        }
        None => BatchMetadata {
            mode: MatchMode::Ranked,
            reference_actor: reference_actor.map(str::to_string).or(raw.reference_actor),
            reference_ranking: Vec::new(),
        },
    };

    BatchResponse { items, metadata }
}
