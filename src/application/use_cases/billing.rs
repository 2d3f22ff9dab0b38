use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::domain::entities::subscription::{
    BillingProvider, Subscription, SubscriptionPlan, SubscriptionStatus,
};

// ============================================================================
// Inputs
// ============================================================================

/// Full canonical state produced by a purchase event.
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub user_id: Uuid,
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub revenuecat_app_user_id: Option<String>,
    pub current_period_end: Option<NaiveDateTime>,
    pub cancel_at_period_end: bool,
    pub source: BillingProvider,
    pub event_at: NaiveDateTime,
}

/// Partial update produced by a lifecycle event; `None` keeps the stored value.
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub plan: Option<SubscriptionPlan>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<NaiveDateTime>,
    pub cancel_at_period_end: Option<bool>,
    pub source: BillingProvider,
    pub event_at: NaiveDateTime,
}

/// Outcome of an ordering-gated write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// A later or equal event was already applied; the write was discarded.
    Stale,
    /// No subscription row matched the key.
    Missing,
}

// ============================================================================
// Repository Traits
// ============================================================================

/// Canonical subscription store. Every write carries the ordering guard in the
/// statement itself (`last_event_at` absent or strictly older than the
/// incoming event), so neither provider path can bypass it.
#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>>;
    async fn get_by_stripe_customer_id(&self, customer_id: &str)
    -> AppResult<Option<Subscription>>;
    /// Insert or overwrite the canonical record. Provider references merge:
    /// an absent reference never clears a stored one.
    async fn upsert_if_newer(&self, input: &SubscriptionUpsert) -> AppResult<WriteOutcome>;
    async fn update_by_stripe_subscription_id_if_newer(
        &self,
        stripe_subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> AppResult<WriteOutcome>;
    async fn update_by_user_if_newer(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> AppResult<WriteOutcome>;
}

/// Write-once ledger of applied provider events.
#[async_trait]
pub trait BillingEventRepo: Send + Sync {
    /// Atomically record a (provider, event id) pair. `false` means the pair
    /// was already present and the event must be skipped.
    async fn try_record(&self, provider: BillingProvider, event_id: &str) -> AppResult<bool>;
}

// ============================================================================
// Stripe Gateway
// ============================================================================

/// Subscription details fetched from the Stripe API.
#[derive(Debug, Clone)]
pub struct StripeSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    pub price_id: String,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
}

#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn get_subscription(&self, subscription_id: &str) -> AppResult<StripeSubscription>;
}

// ============================================================================
// Plan Catalog
// ============================================================================

/// Fixed provider-reference → plan tables. Prices and product ids are
/// deployment configuration; unknown references are skipped, never guessed.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    stripe_prices: Vec<(String, SubscriptionPlan)>,
    revenuecat_products: Vec<(String, SubscriptionPlan)>,
}

impl PlanCatalog {
    pub fn new(
        stripe_prices: Vec<(String, SubscriptionPlan)>,
        revenuecat_products: Vec<(String, SubscriptionPlan)>,
    ) -> Self {
        Self {
            stripe_prices,
            revenuecat_products,
        }
    }

    pub fn plan_for_stripe_price(&self, price_id: &str) -> Option<SubscriptionPlan> {
        self.stripe_prices
            .iter()
            .find(|(id, _)| id == price_id)
            .map(|(_, plan)| *plan)
    }

    pub fn plan_for_revenuecat_product(&self, product_id: &str) -> Option<SubscriptionPlan> {
        self.revenuecat_products
            .iter()
            .find(|(id, _)| id == product_id)
            .map(|(_, plan)| *plan)
    }
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct BillingUseCases {
    subscription_repo: Arc<dyn SubscriptionRepo>,
    billing_event_repo: Arc<dyn BillingEventRepo>,
    stripe: Arc<dyn StripeGateway>,
    catalog: PlanCatalog,
}

impl BillingUseCases {
    pub fn new(
        subscription_repo: Arc<dyn SubscriptionRepo>,
        billing_event_repo: Arc<dyn BillingEventRepo>,
        stripe: Arc<dyn StripeGateway>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            subscription_repo,
            billing_event_repo,
            stripe,
            catalog,
        }
    }

    /// Idempotency gate. Must be called before any event is applied; a `false`
    /// return means another delivery of the same event already claimed it.
    pub async fn record_event_once(
        &self,
        provider: BillingProvider,
        event_id: &str,
    ) -> AppResult<bool> {
        self.billing_event_repo.try_record(provider, event_id).await
    }

    pub async fn get_subscription(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        self.subscription_repo.get_by_user(user_id).await
    }

    // ========================================================================
    // Stripe events
    // ========================================================================

    /// `checkout.session.completed`: the session carries our user id; the
    /// subscription details (price, period, cancel flag) are fetched from the
    /// Stripe API and folded into the canonical record.
    pub async fn apply_checkout_completed(
        &self,
        user_id: Uuid,
        stripe_subscription_id: &str,
        event_at: NaiveDateTime,
    ) -> AppResult<()> {
        let stripe_sub = self.stripe.get_subscription(stripe_subscription_id).await?;

        let Some(plan) = self.catalog.plan_for_stripe_price(&stripe_sub.price_id) else {
            tracing::error!(
                price_id = %stripe_sub.price_id,
                %user_id,
                "No plan mapped for Stripe price id, skipping checkout event"
            );
            return Ok(());
        };

        let input = SubscriptionUpsert {
            user_id,
            plan,
            status: SubscriptionStatus::Active,
            stripe_customer_id: Some(stripe_sub.customer_id),
            stripe_subscription_id: Some(stripe_sub.id),
            revenuecat_app_user_id: None,
            current_period_end: stripe_sub.current_period_end.and_then(timestamp_to_naive),
            cancel_at_period_end: stripe_sub.cancel_at_period_end,
            source: BillingProvider::Stripe,
            event_at,
        };

        match self.subscription_repo.upsert_if_newer(&input).await? {
            WriteOutcome::Applied => {}
            outcome => {
                tracing::debug!(%user_id, ?outcome, "Checkout event discarded by ordering gate");
            }
        }
        Ok(())
    }

    /// `customer.subscription.updated`: the event carries only the customer
    /// reference. Without a mapped subscription there is no user to update, so
    /// the event is skipped.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_stripe_subscription_updated(
        &self,
        customer_id: &str,
        stripe_subscription_id: &str,
        status: SubscriptionStatus,
        price_id: Option<&str>,
        current_period_end: Option<NaiveDateTime>,
        cancel_at_period_end: bool,
        event_at: NaiveDateTime,
    ) -> AppResult<()> {
        if self
            .subscription_repo
            .get_by_stripe_customer_id(customer_id)
            .await?
            .is_none()
        {
            tracing::debug!(
                customer_id,
                "No subscription mapped to Stripe customer, skipping update"
            );
            return Ok(());
        }

        let update = SubscriptionUpdate {
            plan: price_id.and_then(|p| self.catalog.plan_for_stripe_price(p)),
            status,
            current_period_end,
            cancel_at_period_end: Some(cancel_at_period_end),
            source: BillingProvider::Stripe,
            event_at,
        };

        let outcome = self
            .subscription_repo
            .update_by_stripe_subscription_id_if_newer(stripe_subscription_id, &update)
            .await?;
        if outcome != WriteOutcome::Applied {
            tracing::debug!(
                stripe_subscription_id,
                ?outcome,
                "Subscription update discarded"
            );
        }
        Ok(())
    }

    /// `customer.subscription.deleted`: the subscription ends. Plan and period
    /// end are left as a historical record.
    pub async fn apply_stripe_subscription_deleted(
        &self,
        stripe_subscription_id: &str,
        event_at: NaiveDateTime,
    ) -> AppResult<()> {
        let update = SubscriptionUpdate {
            plan: None,
            status: SubscriptionStatus::Canceled,
            current_period_end: None,
            cancel_at_period_end: Some(false),
            source: BillingProvider::Stripe,
            event_at,
        };

        let outcome = self
            .subscription_repo
            .update_by_stripe_subscription_id_if_newer(stripe_subscription_id, &update)
            .await?;
        if outcome != WriteOutcome::Applied {
            tracing::debug!(
                stripe_subscription_id,
                ?outcome,
                "Subscription deletion discarded"
            );
        }
        Ok(())
    }

    // ========================================================================
    // RevenueCat events
    // ========================================================================

    /// `INITIAL_PURCHASE` / `RENEWAL`: this provider supplies our user id
    /// natively, so the record is upserted directly.
    pub async fn apply_mobile_purchase(
        &self,
        user_id: Uuid,
        app_user_id: &str,
        product_id: &str,
        expires_at: Option<NaiveDateTime>,
        event_at: NaiveDateTime,
    ) -> AppResult<()> {
        let Some(plan) = self.catalog.plan_for_revenuecat_product(product_id) else {
            tracing::error!(
                product_id,
                %user_id,
                "No plan mapped for RevenueCat product id, skipping purchase event"
            );
            return Ok(());
        };

        let input = SubscriptionUpsert {
            user_id,
            plan,
            status: SubscriptionStatus::Active,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            revenuecat_app_user_id: Some(app_user_id.to_string()),
            current_period_end: expires_at,
            cancel_at_period_end: false,
            source: BillingProvider::Revenuecat,
            event_at,
        };

        match self.subscription_repo.upsert_if_newer(&input).await? {
            WriteOutcome::Applied => {}
            outcome => {
                tracing::debug!(%user_id, ?outcome, "Purchase event discarded by ordering gate");
            }
        }
        Ok(())
    }

    /// `CANCELLATION` / `EXPIRATION`.
    pub async fn apply_mobile_cancellation(
        &self,
        user_id: Uuid,
        event_at: NaiveDateTime,
    ) -> AppResult<()> {
        self.apply_mobile_status(user_id, SubscriptionStatus::Canceled, event_at)
            .await
    }

    /// `BILLING_ISSUE`.
    pub async fn apply_mobile_billing_issue(
        &self,
        user_id: Uuid,
        event_at: NaiveDateTime,
    ) -> AppResult<()> {
        self.apply_mobile_status(user_id, SubscriptionStatus::PastDue, event_at)
            .await
    }

    async fn apply_mobile_status(
        &self,
        user_id: Uuid,
        status: SubscriptionStatus,
        event_at: NaiveDateTime,
    ) -> AppResult<()> {
        let update = SubscriptionUpdate {
            plan: None,
            status,
            current_period_end: None,
            cancel_at_period_end: None,
            source: BillingProvider::Revenuecat,
            event_at,
        };

        let outcome = self
            .subscription_repo
            .update_by_user_if_newer(user_id, &update)
            .await?;
        if outcome != WriteOutcome::Applied {
            tracing::debug!(%user_id, ?status, ?outcome, "Mobile status event discarded");
        }
        Ok(())
    }
}

/// Convert a Unix timestamp to NaiveDateTime.
pub fn timestamp_to_naive(secs: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
}

/// Convert a millisecond Unix timestamp to NaiveDateTime.
pub fn timestamp_ms_to_naive(millis: i64) -> Option<NaiveDateTime> {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis).map(|dt| dt.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        InMemoryBillingEventRepo, InMemorySubscriptionRepo, StubStripeGateway, test_plan_catalog,
    };

    fn use_cases(
        subscription_repo: Arc<InMemorySubscriptionRepo>,
        stripe: StubStripeGateway,
    ) -> BillingUseCases {
        BillingUseCases::new(
            subscription_repo,
            Arc::new(InMemoryBillingEventRepo::new()),
            Arc::new(stripe),
            test_plan_catalog(),
        )
    }

    fn stripe_sub(id: &str, customer: &str, price: &str) -> StripeSubscription {
        StripeSubscription {
            id: id.to_string(),
            customer_id: customer.to_string(),
            status: "active".to_string(),
            price_id: price.to_string(),
            current_period_end: Some(1_900_000_000),
            cancel_at_period_end: false,
        }
    }

    fn at(secs: i64) -> NaiveDateTime {
        timestamp_to_naive(secs).unwrap()
    }

    // ========================================================================
    // Dedup ledger
    // ========================================================================

    #[tokio::test]
    async fn same_event_id_is_recorded_once() {
        let billing = use_cases(
            Arc::new(InMemorySubscriptionRepo::new()),
            StubStripeGateway::new(),
        );

        assert!(
            billing
                .record_event_once(BillingProvider::Stripe, "evt_1")
                .await
                .unwrap()
        );
        assert!(
            !billing
                .record_event_once(BillingProvider::Stripe, "evt_1")
                .await
                .unwrap()
        );
        // Same id from the other provider is a distinct event
        assert!(
            billing
                .record_event_once(BillingProvider::Revenuecat, "evt_1")
                .await
                .unwrap()
        );
    }

    // ========================================================================
    // Checkout + deletion scenario
    // ========================================================================

    #[tokio::test]
    async fn checkout_then_deletion_keeps_plan_as_history() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let user_id = Uuid::new_v4();
        let billing = use_cases(
            repo.clone(),
            StubStripeGateway::with_subscription(stripe_sub("sub_1", "cus_1", "price_pro")),
        );

        billing
            .apply_checkout_completed(user_id, "sub_1", at(1_000))
            .await
            .unwrap();

        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.plan, SubscriptionPlan::Pro);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(sub.stripe_subscription_id.as_deref(), Some("sub_1"));

        billing
            .apply_stripe_subscription_deleted("sub_1", at(2_000))
            .await
            .unwrap();

        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert!(!sub.cancel_at_period_end);
        // Plan and period end survive as a historical record
        assert_eq!(sub.plan, SubscriptionPlan::Pro);
        assert!(sub.current_period_end.is_some());
    }

    #[tokio::test]
    async fn checkout_with_unmapped_price_is_skipped() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let user_id = Uuid::new_v4();
        let billing = use_cases(
            repo.clone(),
            StubStripeGateway::with_subscription(stripe_sub("sub_1", "cus_1", "price_unknown")),
        );

        billing
            .apply_checkout_completed(user_id, "sub_1", at(1_000))
            .await
            .unwrap();
        assert!(repo.get_by_user(user_id).await.unwrap().is_none());
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    #[tokio::test]
    async fn out_of_order_update_is_discarded() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let user_id = Uuid::new_v4();
        let billing = use_cases(
            repo.clone(),
            StubStripeGateway::with_subscription(stripe_sub("sub_1", "cus_1", "price_pro")),
        );

        billing
            .apply_checkout_completed(user_id, "sub_1", at(1_000))
            .await
            .unwrap();

        // Newer update arrives first: period end t2, still active
        let t2 = at(5_000);
        billing
            .apply_stripe_subscription_updated(
                "cus_1",
                "sub_1",
                SubscriptionStatus::Active,
                Some("price_pro"),
                Some(at(2_000_000)),
                false,
                t2,
            )
            .await
            .unwrap();

        // Older update arrives late: would flip to past_due
        let t1 = at(3_000);
        billing
            .apply_stripe_subscription_updated(
                "cus_1",
                "sub_1",
                SubscriptionStatus::PastDue,
                Some("price_pro"),
                Some(at(1_000_000)),
                false,
                t1,
            )
            .await
            .unwrap();

        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.current_period_end, Some(at(2_000_000)));
        assert_eq!(sub.last_event_at, Some(t2));
    }

    #[tokio::test]
    async fn equal_timestamp_is_discarded() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let user_id = Uuid::new_v4();
        let billing = use_cases(
            repo.clone(),
            StubStripeGateway::with_subscription(stripe_sub("sub_1", "cus_1", "price_pro")),
        );

        billing
            .apply_checkout_completed(user_id, "sub_1", at(1_000))
            .await
            .unwrap();
        billing
            .apply_stripe_subscription_updated(
                "cus_1",
                "sub_1",
                SubscriptionStatus::PastDue,
                None,
                None,
                false,
                at(1_000),
            )
            .await
            .unwrap();

        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn update_for_unmapped_customer_is_skipped() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let billing = use_cases(repo.clone(), StubStripeGateway::new());

        // No row for this customer: no user to update, no error either
        billing
            .apply_stripe_subscription_updated(
                "cus_missing",
                "sub_missing",
                SubscriptionStatus::Active,
                None,
                None,
                false,
                at(1_000),
            )
            .await
            .unwrap();
    }

    // ========================================================================
    // RevenueCat events
    // ========================================================================

    #[tokio::test]
    async fn mobile_purchase_creates_active_subscription() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let user_id = Uuid::new_v4();
        let billing = use_cases(repo.clone(), StubStripeGateway::new());

        billing
            .apply_mobile_purchase(
                user_id,
                &user_id.to_string(),
                "rc_basic",
                Some(at(2_000_000)),
                at(1_000),
            )
            .await
            .unwrap();

        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.plan, SubscriptionPlan::Basic);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.last_event_source, Some(BillingProvider::Revenuecat));
    }

    #[tokio::test]
    async fn mobile_billing_issue_marks_past_due() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let user_id = Uuid::new_v4();
        let billing = use_cases(repo.clone(), StubStripeGateway::new());

        billing
            .apply_mobile_purchase(user_id, &user_id.to_string(), "rc_pro", None, at(1_000))
            .await
            .unwrap();
        billing
            .apply_mobile_billing_issue(user_id, at(2_000))
            .await
            .unwrap();

        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert_eq!(sub.plan, SubscriptionPlan::Pro);
    }

    #[tokio::test]
    async fn dual_provider_references_merge() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let user_id = Uuid::new_v4();
        let billing = use_cases(
            repo.clone(),
            StubStripeGateway::with_subscription(stripe_sub("sub_1", "cus_1", "price_pro")),
        );

        billing
            .apply_checkout_completed(user_id, "sub_1", at(1_000))
            .await
            .unwrap();
        billing
            .apply_mobile_purchase(
                user_id,
                &user_id.to_string(),
                "rc_enterprise",
                None,
                at(2_000),
            )
            .await
            .unwrap();

        // The mobile purchase wins (newer) but the Stripe linkage survives
        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.plan, SubscriptionPlan::Enterprise);
        assert_eq!(sub.stripe_customer_id.as_deref(), Some("cus_1"));
        assert!(sub.revenuecat_app_user_id.is_some());
    }

    #[tokio::test]
    async fn stale_mobile_cancellation_is_discarded() {
        let repo = Arc::new(InMemorySubscriptionRepo::new());
        let user_id = Uuid::new_v4();
        let billing = use_cases(repo.clone(), StubStripeGateway::new());

        billing
            .apply_mobile_purchase(user_id, &user_id.to_string(), "rc_pro", None, at(5_000))
            .await
            .unwrap();
        // A cancellation older than the purchase must not apply
        billing
            .apply_mobile_cancellation(user_id, at(4_000))
            .await
            .unwrap();

        let sub = repo.get_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn cancellation_without_subscription_is_skipped() {
        let billing = use_cases(Arc::new(InMemorySubscriptionRepo::new()), StubStripeGateway::new());
        billing
            .apply_mobile_cancellation(Uuid::new_v4(), at(1_000))
            .await
            .unwrap();
    }

    // ========================================================================
    // Catalog
    // ========================================================================

    #[test]
    fn catalog_lookups() {
        let catalog = test_plan_catalog();
        assert_eq!(
            catalog.plan_for_stripe_price("price_basic"),
            Some(SubscriptionPlan::Basic)
        );
        assert_eq!(
            catalog.plan_for_revenuecat_product("rc_enterprise"),
            Some(SubscriptionPlan::Enterprise)
        );
        assert_eq!(catalog.plan_for_stripe_price("price_nope"), None);
        assert_eq!(catalog.plan_for_revenuecat_product(""), None);
    }
}
