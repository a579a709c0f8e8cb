//! Batch orchestration: quota check, gateway call, usage recording.
//!
//! Admission is decided before the backend is contacted; usage is recorded
//! only after a successful call and only for items that produced a result.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::models::{BatchRequest, BatchResponse, PlanLimits, SubscriptionState};
use crate::modules::quota;
use crate::modules::store::QuotaStore;
use crate::proxy::common::error::GatewayError;
use crate::proxy::upstream::client::MatchBackend;

/// Which quota blocked a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Images,
    Actors,
}

/// Caller-visible result of one submission
#[derive(Debug)]
pub enum Outcome {
    Completed {
        response: BatchResponse,
        success_count: usize,
        failed_count: usize,
        subscription: SubscriptionState,
    },
    /// Expected, user-actionable; carries what an upgrade prompt needs
    QuotaBlocked {
        reason: BlockReason,
        subscription: SubscriptionState,
        upgrade: PlanLimits,
    },
    Failed { cause: GatewayError },
}

/// Clock source, injectable for tests
pub type Clock = Arc<dyn Fn() -> DateTime<Local> + Send + Sync>;

pub struct BatchOrchestrator {
    store: Arc<dyn QuotaStore>,
    backend: Arc<dyn MatchBackend>,
    clock: Clock,
    // Serialises read-modify-write of the record within this process
    state_lock: Mutex<()>,
}

impl BatchOrchestrator {
    pub fn new(store: Arc<dyn QuotaStore>, backend: Arc<dyn MatchBackend>) -> Self {
        Self::with_clock(store, backend, Arc::new(Local::now))
    }

    pub fn with_clock(store: Arc<dyn QuotaStore>, backend: Arc<dyn MatchBackend>, clock: Clock) -> Self {
        Self {
            store,
            backend,
            clock,
            state_lock: Mutex::new(()),
        }
    }

    /// Read-only snapshot with rollover applied
    pub fn current_state(&self) -> SubscriptionState {
        quota::load_or_init_at(self.store.as_ref(), &(self.clock)())
    }

    pub fn upgrade(&self) -> SubscriptionState {
        self.mutate("upgrade", |state, _| quota::upgrade(state))
    }

    pub fn downgrade(&self) -> SubscriptionState {
        self.mutate("downgrade", |state, now| quota::downgrade_at(state, now))
    }

    /// Load, transform and persist under the state lock. A failed write is
    /// logged and the new state still returned: the quota is advisory.
    fn mutate<F>(&self, action: &str, f: F) -> SubscriptionState
    where
        F: FnOnce(&SubscriptionState, &DateTime<Local>) -> SubscriptionState,
    {
        let _guard = self.state_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = (self.clock)();
        let current = quota::load_or_init_at(self.store.as_ref(), &now);
        let next = f(&current, &now);
        if let Err(e) = self.store.save(&next) {
            crate::modules::logger::log_error(&format!(
                "Failed to persist subscription after {}: {}",
                action, e
            ));
        }
        next
    }

    pub async fn submit(&self, request: BatchRequest) -> Outcome {
        let request_id = Uuid::new_v4();

        if request.is_empty() {
            return Outcome::Failed {
                cause: GatewayError::InvalidRequest("no image files uploaded".to_string()),
            };
        }
        if request.top_k == 0 {
            return Outcome::Failed {
                cause: GatewayError::InvalidRequest("top_k must be at least 1".to_string()),
            };
        }

        let state = self.current_state();

        if !quota::can_admit_images(&state, request.len()) {
            tracing::info!(
                "[{}] Blocked: {} images requested, {:?} remaining",
                request_id,
                request.len(),
                quota::remaining_images(&state)
            );
            return Outcome::QuotaBlocked {
                reason: BlockReason::Images,
                subscription: state,
                upgrade: PlanLimits::PREMIUM,
            };
        }

        if !quota::can_admit_actor_count(&state, request.top_k) {
            tracing::info!(
                "[{}] Blocked: top_k {} over plan ceiling {}",
                request_id,
                request.top_k,
                state.max_actors
            );
            return Outcome::QuotaBlocked {
                reason: BlockReason::Actors,
                subscription: state,
                upgrade: PlanLimits::PREMIUM,
            };
        }

        tracing::info!(
            "[{}] Submitting {} images | top_k: {} | reference: {}",
            request_id,
            request.len(),
            request.top_k,
            request.reference_actor.as_deref().unwrap_or("-")
        );

        let response = match self
            .backend
            .match_batch(&request)
            .instrument(tracing::info_span!("batch", request_id = %request_id))
            .await
        {
            Ok(response) => response,
            Err(cause) => {
                tracing::warn!("[{}] Batch failed ({}): {}", request_id, cause.kind(), cause);
                return Outcome::Failed { cause };
            }
        };

        let success_count = response.success_count();
        let failed_count = request.len().saturating_sub(success_count);

        // Re-read so a plan change made during the call is not overwritten
        let subscription = self.mutate("usage recording", |current, _| {
            quota::record_usage(current, success_count)
        });

        tracing::info!(
            "[{}] Completed: {} succeeded, {} failed, {} images used this period",
            request_id,
            success_count,
            failed_count,
            subscription.used_images
        );

        Outcome::Completed {
            response,
            success_count,
            failed_count,
            subscription,
        }
    }
}
