//! Purchase ledger: records plan purchase intents and settles them from
//! payment-provider callbacks.

use crate::models::{
    BillingCycle, NewPurchaseOrder, PlanTier, PurchaseOrder, PurchaseStatus, PurchaseTransition,
};
use crate::services::entitlement::EntitlementApplier;
use crate::services::error::BillingError;
use crate::services::metrics::{
    record_purchase_amount, record_purchase_initiated, record_purchase_transition,
};
use crate::services::store::Stores;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

const DEFAULT_CURRENCY: &str = "USD";

/// Raw purchase intent as received from the client.
#[derive(Debug, Clone)]
pub struct InitiatePurchase {
    pub order_id: String,
    pub subscriber_ref: String,
    pub plan: String,
    pub billing_cycle: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub track_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// The order moved to the requested status.
    Applied(PurchaseOrder),
    /// The order was already settled; nothing changed.
    Unchanged(PurchaseOrder),
}

impl CallbackOutcome {
    pub fn purchase(&self) -> &PurchaseOrder {
        match self {
            CallbackOutcome::Applied(p) | CallbackOutcome::Unchanged(p) => p,
        }
    }
}

#[derive(Clone)]
pub struct PurchaseLedger {
    stores: Stores,
    entitlements: EntitlementApplier,
}

fn required(value: &str, field: &str) -> Result<String, BillingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BillingError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

impl PurchaseLedger {
    pub fn new(stores: Stores, entitlements: EntitlementApplier) -> Self {
        Self {
            stores,
            entitlements,
        }
    }

    /// Record a purchase intent. A provider tracking id means the provider
    /// already accepted the order, so it starts pending.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn initiate(&self, input: InitiatePurchase) -> Result<PurchaseOrder, BillingError> {
        let order_id = required(&input.order_id, "orderId")?;
        let subscriber_ref = required(&input.subscriber_ref, "userId")?;
        let plan: PlanTier = input
            .plan
            .parse()
            .map_err(BillingError::Validation)?;
        let billing_cycle: BillingCycle = input
            .billing_cycle
            .parse()
            .map_err(BillingError::Validation)?;
        if input.amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        let currency = input
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_uppercase();
        let track_id = input
            .track_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let order = NewPurchaseOrder {
            subscriber_id: Uuid::parse_str(&subscriber_ref).ok(),
            raw_subscriber_ref: subscriber_ref,
            order_id,
            plan,
            billing_cycle,
            amount: input.amount,
            currency,
            status: if track_id.is_some() {
                PurchaseStatus::Pending
            } else {
                PurchaseStatus::Initiated
            },
            track_id,
        };

        let purchase = self
            .stores
            .bounded("insert_purchase", self.stores.purchases.insert_purchase(&order))
            .await?;

        record_purchase_initiated(plan.as_str(), billing_cycle.as_str());
        info!(
            order_id = %purchase.order_id,
            plan = %purchase.plan,
            status = %purchase.status,
            "Purchase initiated"
        );

        Ok(purchase)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, order_id: &str) -> Result<PurchaseOrder, BillingError> {
        self.stores
            .bounded("get_purchase", self.stores.purchases.get_purchase(order_id))
            .await?
            .ok_or_else(|| BillingError::NotFound("Purchase order".to_string()))
    }

    /// Apply a provider status callback.
    ///
    /// Terminal orders are never changed again; repeats succeed as no-ops.
    /// A `paid` transition and its plan entitlement are written together, so
    /// a failed write leaves both untouched.
    #[instrument(skip(self))]
    pub async fn apply_callback(
        &self,
        order_id: &str,
        status: &str,
    ) -> Result<CallbackOutcome, BillingError> {
        let order_id = required(order_id, "order_id")?;
        let target: PurchaseStatus = status.parse().map_err(BillingError::Validation)?;
        if target == PurchaseStatus::Initiated {
            return Err(BillingError::Validation(
                "initiated is not a valid callback status".to_string(),
            ));
        }

        let current = self.get(&order_id).await?;
        let previous = current.status();
        if previous.is_terminal() {
            info!(order_id = %order_id, status = %current.status, "Order already settled, callback ignored");
            record_purchase_transition(target.as_str(), "noop");
            return Ok(CallbackOutcome::Unchanged(current));
        }

        let transition = match target {
            PurchaseStatus::Paid => {
                let now = Utc::now();
                PurchaseTransition {
                    status: target,
                    paid_at: Some(now),
                    expires_at: Some(now + current.cycle().entitlement_period()),
                }
            }
            _ => PurchaseTransition {
                status: target,
                paid_at: None,
                expires_at: None,
            },
        };

        let claimed = if target == PurchaseStatus::Paid {
            self.entitlements
                .apply(&current, &transition)
                .await?
                .map(|settlement| settlement.purchase)
        } else {
            self.stores
                .bounded(
                    "transition_purchase",
                    self.stores.purchases.transition_purchase(&order_id, &transition),
                )
                .await?
        };

        let Some(updated) = claimed else {
            // Another callback settled the order between our read and write.
            record_purchase_transition(target.as_str(), "noop");
            let settled = self.get(&order_id).await?;
            return Ok(CallbackOutcome::Unchanged(settled));
        };

        if target == PurchaseStatus::Paid {
            record_purchase_amount(
                &updated.currency,
                &updated.plan,
                updated.amount.to_f64().unwrap_or_default(),
            );
        }

        record_purchase_transition(target.as_str(), "applied");
        info!(
            order_id = %order_id,
            from = previous.as_str(),
            to = target.as_str(),
            "Purchase status updated"
        );

        Ok(CallbackOutcome::Applied(updated))
    }
}
