//! Applies a paid plan to the subscriber record and sends the welcome
//! notification.

use crate::config::NotificationConfig;
use crate::models::{
    EntitlementGrant, PlanTier, PurchaseOrder, PurchaseTransition, Settlement, Subscriber,
};
use crate::services::error::BillingError;
use crate::services::metrics::{record_entitlement, record_notification};
use crate::services::notifier::{Notification, Notifier};
use crate::services::store::Stores;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct EntitlementApplier {
    stores: Stores,
    notifier: Arc<dyn Notifier>,
    notification: NotificationConfig,
}

impl EntitlementApplier {
    pub fn new(
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        notification: NotificationConfig,
    ) -> Self {
        Self {
            stores,
            notifier,
            notification,
        }
    }

    /// Mark `purchase` paid and grant its plan in one store write.
    ///
    /// Returns `None` when the order was no longer open. Only a store
    /// failure is an error; in that case neither the order nor the
    /// subscriber changed. An unresolvable subscriber still settles the
    /// order. The welcome notification is queued after the write.
    #[instrument(
        skip(self, purchase, transition),
        fields(order_id = %purchase.order_id, plan = %purchase.plan)
    )]
    pub async fn apply(
        &self,
        purchase: &PurchaseOrder,
        transition: &PurchaseTransition,
    ) -> Result<Option<Settlement>, BillingError> {
        let plan = purchase.plan_tier();
        let grant = match (purchase.subscriber_id, transition.expires_at) {
            (Some(subscriber_id), Some(expires_at)) => Some(EntitlementGrant {
                subscriber_id,
                plan,
                expires_at,
            }),
            _ => {
                warn!(
                    subscriber_ref = %purchase.raw_subscriber_ref,
                    "Purchase references no valid subscriber id, entitlement skipped"
                );
                None
            }
        };

        let settled = self
            .stores
            .bounded(
                "settle_paid",
                self.stores
                    .purchases
                    .settle_paid(&purchase.order_id, transition, grant.as_ref()),
            )
            .await?;

        let Some(settlement) = settled else {
            return Ok(None);
        };

        match (&settlement.subscriber, &grant) {
            (Some(subscriber), Some(grant)) => {
                record_entitlement(plan.as_str(), "applied");
                info!(
                    subscriber_id = %subscriber.subscriber_id,
                    expires_at = %grant.expires_at,
                    "Plan entitlement applied"
                );
                self.enqueue_welcome(subscriber, grant);
            }
            (None, Some(grant)) => {
                warn!(
                    subscriber_id = %grant.subscriber_id,
                    "Subscriber not found, entitlement skipped"
                );
                record_entitlement(plan.as_str(), "skipped");
            }
            _ => record_entitlement(plan.as_str(), "skipped"),
        }

        Ok(Some(settlement))
    }

    fn enqueue_welcome(&self, subscriber: &Subscriber, grant: &EntitlementGrant) {
        let recipient = subscriber
            .email
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| self.notification.fallback_recipient.clone());
        let notification =
            plan_welcome(recipient, subscriber.subscriber_id, grant.plan, grant.expires_at);

        tokio::spawn(deliver(
            self.notifier.clone(),
            notification,
            self.notification.timeout,
            subscriber.subscriber_id,
        ));
    }
}

async fn deliver(
    notifier: Arc<dyn Notifier>,
    notification: Notification,
    timeout: Duration,
    subscriber_id: Uuid,
) {
    match tokio::time::timeout(timeout, notifier.send(&notification)).await {
        Ok(Ok(())) => record_notification("sent"),
        Ok(Err(e)) => {
            warn!(error = %e, subscriber_id = %subscriber_id, "Plan notification failed");
            record_notification("failed");
        }
        Err(_) => {
            warn!(subscriber_id = %subscriber_id, "Plan notification timed out");
            record_notification("failed");
        }
    }
}

/// Welcome message listing the plan's features and its expiry date.
pub fn plan_welcome(
    to: String,
    subscriber_id: Uuid,
    plan: PlanTier,
    expires_at: DateTime<Utc>,
) -> Notification {
    let plan_name = plan.as_str().to_uppercase();
    let features: String = plan
        .features()
        .iter()
        .map(|f| format!("<li>{}</li>", f.label()))
        .collect();

    Notification {
        to,
        subject: format!("Welcome to {} plan", plan_name),
        html: format!(
            "<h2>Welcome to the {plan_name} plan</h2>\
             <p>Your plan is active until {}.</p>\
             <p>Included features:</p><ul>{features}</ul>",
            expires_at.format("%Y-%m-%d")
        ),
        meta: json!({
            "type": "plan_welcome",
            "plan": plan.as_str(),
            "user_id": subscriber_id.to_string(),
        }),
    }
}
