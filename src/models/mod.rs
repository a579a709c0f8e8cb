pub mod batch;
pub mod config;
pub mod subscription;

pub use batch::{
    ActorMatch, BatchImage, BatchItemResult, BatchMetadata, BatchRequest, BatchResponse,
    MatchMode, MatchOutcome, ReferenceRank,
};
pub use config::AppConfig;
pub use subscription::{Plan, PlanLimits, SubscriptionSnapshot, SubscriptionState, UNLIMITED_IMAGES};
