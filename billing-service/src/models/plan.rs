//! Plan tiers, billing cycles and the static capability table.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
    Agency,
}

/// A capability granted by a plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanFeature {
    CoreInvoicing,
    EmailDelivery,
    ClientPortal,
    UnlimitedInvoices,
    BrandedEmails,
    RecurringBilling,
    BasicAnalytics,
    UnlimitedTeamMembers,
    WhiteLabelEmailing,
    AdvancedAnalytics,
    PrioritySupport,
}

const FREE_FEATURES: &[PlanFeature] = &[
    PlanFeature::CoreInvoicing,
    PlanFeature::EmailDelivery,
    PlanFeature::ClientPortal,
];

const PRO_FEATURES: &[PlanFeature] = &[
    PlanFeature::UnlimitedInvoices,
    PlanFeature::BrandedEmails,
    PlanFeature::RecurringBilling,
    PlanFeature::BasicAnalytics,
];

const AGENCY_FEATURES: &[PlanFeature] = &[
    PlanFeature::UnlimitedTeamMembers,
    PlanFeature::WhiteLabelEmailing,
    PlanFeature::AdvancedAnalytics,
    PlanFeature::PrioritySupport,
];

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Agency => "agency",
        }
    }

    /// Lenient conversion for values read back from storage.
    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(PlanTier::Free)
    }

    /// Features advertised for this tier.
    pub fn features(&self) -> &'static [PlanFeature] {
        match self {
            PlanTier::Free => FREE_FEATURES,
            PlanTier::Pro => PRO_FEATURES,
            PlanTier::Agency => AGENCY_FEATURES,
        }
    }

    pub fn includes(&self, feature: PlanFeature) -> bool {
        self.features().contains(&feature)
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "agency" => Ok(PlanTier::Agency),
            other => Err(format!("Unknown plan '{}'", other)),
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlanFeature {
    pub fn label(&self) -> &'static str {
        match self {
            PlanFeature::CoreInvoicing => "Core invoicing",
            PlanFeature::EmailDelivery => "Email delivery",
            PlanFeature::ClientPortal => "Client portal",
            PlanFeature::UnlimitedInvoices => "Unlimited invoices",
            PlanFeature::BrandedEmails => "Branded emails",
            PlanFeature::RecurringBilling => "Recurring billing",
            PlanFeature::BasicAnalytics => "Basic analytics",
            PlanFeature::UnlimitedTeamMembers => "Unlimited team members",
            PlanFeature::WhiteLabelEmailing => "White-label emailing",
            PlanFeature::AdvancedAnalytics => "Advanced analytics",
            PlanFeature::PrioritySupport => "Priority support",
        }
    }
}

/// Billing cycle of a plan purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        s.parse().unwrap_or(BillingCycle::Monthly)
    }

    /// How long a paid purchase entitles the subscriber.
    pub fn entitlement_period(&self) -> Duration {
        match self {
            BillingCycle::Monthly => Duration::days(30),
            BillingCycle::Yearly => Duration::days(365),
        }
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(format!("Unknown billing cycle '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_table_matches_tiers() {
        assert_eq!(
            PlanTier::Free.features(),
            &[
                PlanFeature::CoreInvoicing,
                PlanFeature::EmailDelivery,
                PlanFeature::ClientPortal
            ]
        );
        assert!(PlanTier::Pro.includes(PlanFeature::RecurringBilling));
        assert!(PlanTier::Agency.includes(PlanFeature::PrioritySupport));
        assert!(!PlanTier::Pro.includes(PlanFeature::WhiteLabelEmailing));
    }

    #[test]
    fn feature_labels_are_human_readable() {
        let labels: Vec<_> = PlanTier::Agency.features().iter().map(|f| f.label()).collect();
        assert_eq!(
            labels,
            vec![
                "Unlimited team members",
                "White-label emailing",
                "Advanced analytics",
                "Priority support"
            ]
        );
    }

    #[test]
    fn parses_plan_and_cycle_strictly() {
        assert_eq!("Pro".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert!("enterprise".parse::<PlanTier>().is_err());
        assert_eq!("yearly".parse::<BillingCycle>().unwrap(), BillingCycle::Yearly);
        assert!("weekly".parse::<BillingCycle>().is_err());
    }

    #[test]
    fn entitlement_periods() {
        assert_eq!(BillingCycle::Monthly.entitlement_period(), Duration::days(30));
        assert_eq!(BillingCycle::Yearly.entitlement_period(), Duration::days(365));
    }
}
