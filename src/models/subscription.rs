use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel stored in `max_images` for plans without an image ceiling
pub const UNLIMITED_IMAGES: i64 = -1;

/// Subscription plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Premium,
}

impl Default for Plan {
    fn default() -> Self {
        Self::Free
    }
}

/// Per-plan ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanLimits {
    pub max_actors: u32,
    pub max_images: i64,
}

impl PlanLimits {
    pub const FREE: PlanLimits = PlanLimits {
        max_actors: 5,
        max_images: 10,
    };

    pub const PREMIUM: PlanLimits = PlanLimits {
        max_actors: 50,
        max_images: UNLIMITED_IMAGES,
    };

    pub fn for_plan(plan: Plan) -> Self {
        match plan {
            Plan::Free => Self::FREE,
            Plan::Premium => Self::PREMIUM,
        }
    }
}

/// Persisted subscription record. The JSON shape (camelCase keys, `resetDate`
/// as an RFC 3339 string, empty for premium) is the on-disk format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionState {
    pub plan: Plan,
    pub max_actors: u32,
    pub max_images: i64,
    pub used_images: u32,
    #[serde(default, with = "reset_date_format")]
    pub reset_date: Option<DateTime<Utc>>,
}

impl SubscriptionState {
    pub fn free(reset_date: DateTime<Utc>) -> Self {
        let limits = PlanLimits::FREE;
        Self {
            plan: Plan::Free,
            max_actors: limits.max_actors,
            max_images: limits.max_images,
            used_images: 0,
            reset_date: Some(reset_date),
        }
    }

    pub fn premium() -> Self {
        let limits = PlanLimits::PREMIUM;
        Self {
            plan: Plan::Premium,
            max_actors: limits.max_actors,
            max_images: limits.max_images,
            used_images: 0,
            reset_date: None,
        }
    }

    pub fn is_premium(&self) -> bool {
        self.plan == Plan::Premium
    }
}

/// Read-only view handed to display surfaces
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSnapshot {
    #[serde(flatten)]
    pub state: SubscriptionState,
    /// `None` means unlimited
    pub remaining_images: Option<u32>,
    pub is_premium: bool,
}

mod reset_date_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(date) => serializer.serialize_str(&date.to_rfc3339()),
            None => serializer.serialize_str(""),
        }
    }

    // Empty or unparsable dates read as missing; normalisation recomputes them.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|d| d.with_timezone(&Utc)))
    }
}
