//! Subscriber model (plan fields only).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::plan::PlanTier;

/// Account holder whose plan is driven by purchases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Subscriber {
    pub subscriber_id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub plan: String,
    pub plan_expires_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscriber {
    /// A new subscriber on the free tier.
    pub fn new(subscriber_id: Uuid, email: Option<String>, name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            subscriber_id,
            email,
            name,
            plan: PlanTier::Free.as_str().to_string(),
            plan_expires_at: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn plan_tier(&self) -> PlanTier {
        PlanTier::from_string(&self.plan)
    }
}
