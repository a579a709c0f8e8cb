use bytes::Bytes;
use serde::Serialize;

/// One uploaded image
#[derive(Debug, Clone)]
pub struct BatchImage {
    pub filename: String,
    /// MIME type declared by the caller, if any
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl BatchImage {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A batch submission: ordered images, result count K and optional reference actor
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub images: Vec<BatchImage>,
    pub top_k: u32,
    pub reference_actor: Option<String>,
}

impl BatchRequest {
    pub fn new(images: Vec<BatchImage>, top_k: u32) -> Self {
        Self {
            images,
            top_k,
            reference_actor: None,
        }
    }

    /// Blank text means no reference actor.
    pub fn with_reference_actor(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        self.reference_actor = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// A ranked candidate actor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorMatch {
    pub name: String,
    /// Similarity in [0, 1]
    pub score: f64,
    pub image_url: Option<String>,
    pub is_reference: bool,
}

/// Outcome for one input image, decided once at the gateway boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MatchOutcome {
    Ranked { results: Vec<ActorMatch> },
    Reference { score: f64, actor_name: String },
    Errored { cause: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

impl BatchItemResult {
    /// Produced a usable result: a non-empty ranking or a reference score
    pub fn is_success(&self) -> bool {
        match &self.outcome {
            MatchOutcome::Ranked { results } => !results.is_empty(),
            MatchOutcome::Reference { .. } => true,
            MatchOutcome::Errored { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Ranked,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceRank {
    pub filename: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct BatchMetadata {
    pub mode: MatchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_actor: Option<String>,
    /// Inputs ordered by reference score, best first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_ranking: Vec<ReferenceRank>,
}

/// Items aligned 1:1 with the request's input order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResponse {
    pub items: Vec<BatchItemResult>,
    pub metadata: BatchMetadata,
}

impl BatchResponse {
    pub fn success_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_success()).count()
    }
}
