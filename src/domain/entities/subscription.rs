use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Source of a billing event feeding the reconciler.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "billing_provider", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BillingProvider {
    Stripe,
    Revenuecat,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "subscription_plan", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SubscriptionPlan {
    Basic,
    Pro,
    Enterprise,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    /// Collapse Stripe's subscription status set onto the canonical one.
    /// Unknown statuses map to past_due: the subscription stays visible but
    /// never gains access it was not explicitly granted.
    pub fn from_stripe(s: &str) -> Self {
        match s {
            "active" | "trialing" => SubscriptionStatus::Active,
            "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
            _ => SubscriptionStatus::PastDue,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

/// Canonical billing record for a user, reconciled from both providers.
///
/// Provider references are nullable because a user may be linked to zero, one,
/// or both providers. `last_event_source`/`last_event_at` record the
/// provenance of the last applied event and drive the ordering rule.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub user_id: Uuid,
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub revenuecat_app_user_id: Option<String>,
    pub current_period_end: Option<chrono::NaiveDateTime>,
    pub cancel_at_period_end: bool,
    pub last_event_source: Option<BillingProvider>,
    pub last_event_at: Option<chrono::NaiveDateTime>,
    pub created_at: Option<chrono::NaiveDateTime>,
    pub updated_at: Option<chrono::NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_status_mapping() {
        assert_eq!(
            SubscriptionStatus::from_stripe("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("trialing"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_stripe("canceled"),
            SubscriptionStatus::Canceled
        );
        // Never grant access for statuses we do not recognize
        assert_eq!(
            SubscriptionStatus::from_stripe("paused"),
            SubscriptionStatus::PastDue
        );
    }
}
