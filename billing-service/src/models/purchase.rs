//! Plan purchase order model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::plan::{BillingCycle, PlanTier};
use super::subscriber::Subscriber;

/// Settlement status of a purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Initiated,
    Pending,
    Paid,
    Expired,
    Failed,
    Cancelled,
}

impl PurchaseStatus {
    /// Statuses an order can still move out of.
    pub const OPEN: [PurchaseStatus; 2] = [PurchaseStatus::Initiated, PurchaseStatus::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Initiated => "initiated",
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Expired => "expired",
            PurchaseStatus::Failed => "failed",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(PurchaseStatus::Pending)
    }

    /// Terminal statuses accept no further transition.
    pub fn is_terminal(&self) -> bool {
        !Self::OPEN.contains(self)
    }
}

impl FromStr for PurchaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "initiated" => Ok(PurchaseStatus::Initiated),
            "pending" => Ok(PurchaseStatus::Pending),
            "paid" => Ok(PurchaseStatus::Paid),
            "expired" => Ok(PurchaseStatus::Expired),
            "failed" => Ok(PurchaseStatus::Failed),
            "cancelled" | "canceled" => Ok(PurchaseStatus::Cancelled),
            other => Err(format!("Unknown purchase status '{}'", other)),
        }
    }
}

/// Plan purchase order, keyed by the externally supplied order id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PurchaseOrder {
    pub order_id: String,
    pub subscriber_id: Option<Uuid>,
    pub raw_subscriber_ref: String,
    pub plan: String,
    pub billing_cycle: String,
    pub amount: Decimal,
    pub currency: String,
    pub gateway: String,
    pub track_id: Option<String>,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn status(&self) -> PurchaseStatus {
        PurchaseStatus::from_string(&self.status)
    }

    pub fn plan_tier(&self) -> PlanTier {
        PlanTier::from_string(&self.plan)
    }

    pub fn cycle(&self) -> BillingCycle {
        BillingCycle::from_string(&self.billing_cycle)
    }
}

/// Validated input for recording a purchase intent.
#[derive(Debug, Clone)]
pub struct NewPurchaseOrder {
    pub order_id: String,
    pub subscriber_id: Option<Uuid>,
    pub raw_subscriber_ref: String,
    pub plan: PlanTier,
    pub billing_cycle: BillingCycle,
    pub amount: Decimal,
    pub currency: String,
    pub track_id: Option<String>,
    pub status: PurchaseStatus,
}

/// Conditional status change applied by the payment callback.
///
/// Stores apply it only while the order is still in one of [`PurchaseStatus::OPEN`].
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseTransition {
    pub status: PurchaseStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Plan and expiry granted to a subscriber when an order is paid.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitlementGrant {
    pub subscriber_id: Uuid,
    pub plan: PlanTier,
    pub expires_at: DateTime<Utc>,
}

/// A paid order and the subscriber it entitled, if that subscriber exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub purchase: PurchaseOrder,
    pub subscriber: Option<Subscriber>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_terminal_statuses() {
        assert!(!PurchaseStatus::Initiated.is_terminal());
        assert!(!PurchaseStatus::Pending.is_terminal());
        for status in [
            PurchaseStatus::Paid,
            PurchaseStatus::Expired,
            PurchaseStatus::Failed,
            PurchaseStatus::Cancelled,
        ] {
            assert!(status.is_terminal(), "{:?} should be terminal", status);
        }
    }

    #[test]
    fn parses_provider_statuses() {
        assert_eq!("PAID".parse::<PurchaseStatus>().unwrap(), PurchaseStatus::Paid);
        assert_eq!(
            "canceled".parse::<PurchaseStatus>().unwrap(),
            PurchaseStatus::Cancelled
        );
        assert!("refunded".parse::<PurchaseStatus>().is_err());
    }
}
