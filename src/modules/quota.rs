//! Quota engine: admission decisions and usage accounting over a [`QuotaStore`].
//!
//! Every operation is a pure function of the state and, where the period
//! matters, of `now`. Rollover happens lazily when the record is read; there
//! is no background timer.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Utc};

use crate::models::{Plan, PlanLimits, SubscriptionSnapshot, SubscriptionState, UNLIMITED_IMAGES};
use crate::modules::store::QuotaStore;

/// First day of the month after `now`, at local midnight of `now`'s zone
pub fn next_reset_date<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    let midnight = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();

    // DST gaps at midnight exist in a few zones; fall back to the UTC reading.
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Free defaults with a fresh period
pub fn initial_state<Tz: TimeZone>(now: &DateTime<Tz>) -> SubscriptionState {
    SubscriptionState::free(next_reset_date(now))
}

/// Repair a persisted record and apply period rollover.
///
/// Ceilings always come from the plan, premium never carries a reset date,
/// and free usage is clamped into `[0, max_images]`.
pub fn normalize<Tz: TimeZone>(mut state: SubscriptionState, now: &DateTime<Tz>) -> SubscriptionState {
    let limits = PlanLimits::for_plan(state.plan);
    state.max_actors = limits.max_actors;
    state.max_images = limits.max_images;

    match state.plan {
        Plan::Premium => {
            state.reset_date = None;
        }
        Plan::Free => {
            let now_utc = now.with_timezone(&Utc);
            let expired = state.reset_date.map_or(true, |reset| now_utc >= reset);
            if expired {
                state.used_images = 0;
                state.reset_date = Some(next_reset_date(now));
            }
            state.used_images = clamp_usage(state.used_images as i64, state.max_images);
        }
    }

    state
}

/// Read the persisted record, or free defaults when absent or malformed
pub fn load_or_init_at<Tz: TimeZone>(store: &dyn QuotaStore, now: &DateTime<Tz>) -> SubscriptionState {
    match store.load() {
        Some(state) => normalize(state, now),
        None => initial_state(now),
    }
}

pub fn load_or_init(store: &dyn QuotaStore) -> SubscriptionState {
    load_or_init_at(store, &Local::now())
}

pub fn can_admit_images(state: &SubscriptionState, count: usize) -> bool {
    if state.is_premium() {
        return true;
    }
    (state.used_images as i64).saturating_add(as_i64(count)) <= state.max_images
}

/// Checked against the plan's own ceiling; free and premium differ
pub fn can_admit_actor_count(state: &SubscriptionState, k: u32) -> bool {
    k <= state.max_actors
}

/// Add successfully processed images. Premium is not metered; free usage
/// never exceeds the ceiling even when racing submissions over-count.
pub fn record_usage(state: &SubscriptionState, success_count: usize) -> SubscriptionState {
    let mut next = state.clone();
    if next.is_premium() {
        return next;
    }
    let total = (next.used_images as i64).saturating_add(as_i64(success_count));
    next.used_images = clamp_usage(total, next.max_images);
    next
}

pub fn upgrade(_state: &SubscriptionState) -> SubscriptionState {
    SubscriptionState::premium()
}

pub fn downgrade_at<Tz: TimeZone>(_state: &SubscriptionState, now: &DateTime<Tz>) -> SubscriptionState {
    initial_state(now)
}

pub fn downgrade(state: &SubscriptionState) -> SubscriptionState {
    downgrade_at(state, &Local::now())
}

/// Images left this period; `None` means unlimited
pub fn remaining_images(state: &SubscriptionState) -> Option<u32> {
    if state.is_premium() || state.max_images == UNLIMITED_IMAGES {
        return None;
    }
    let left = (state.max_images - state.used_images as i64).max(0);
    Some(u32::try_from(left).unwrap_or(u32::MAX))
}

pub fn snapshot(state: &SubscriptionState) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        state: state.clone(),
        remaining_images: remaining_images(state),
        is_premium: state.is_premium(),
    }
}

fn as_i64(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn clamp_usage(value: i64, max_images: i64) -> u32 {
    let upper = max_images.max(0);
    u32::try_from(value.clamp(0, upper)).unwrap_or(u32::MAX)
}
