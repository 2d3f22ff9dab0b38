//! In-memory mock implementations for the billing repository traits.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::billing::{
        BillingEventRepo, StripeGateway, StripeSubscription, SubscriptionRepo, SubscriptionUpdate,
        SubscriptionUpsert, WriteOutcome,
    },
    domain::entities::subscription::Subscription,
    infra::RateLimiterTrait,
};

// ============================================================================
// InMemorySubscriptionRepo
// ============================================================================

/// Mirrors the ordering-gated write semantics of the Postgres implementation:
/// a write only lands when the stored `last_event_at` is absent or strictly
/// older, and provider references merge instead of overwriting.
#[derive(Default)]
pub struct InMemorySubscriptionRepo {
    pub subscriptions: Mutex<HashMap<Uuid, Subscription>>,
}

impl InMemorySubscriptionRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        let map: HashMap<Uuid, Subscription> = subscriptions
            .into_iter()
            .map(|s| (s.user_id, s))
            .collect();
        Self {
            subscriptions: Mutex::new(map),
        }
    }
}

fn apply_update(existing: &mut Subscription, update: &SubscriptionUpdate) {
    if let Some(plan) = update.plan {
        existing.plan = plan;
    }
    existing.status = update.status;
    if let Some(period_end) = update.current_period_end {
        existing.current_period_end = Some(period_end);
    }
    if let Some(cancel) = update.cancel_at_period_end {
        existing.cancel_at_period_end = cancel;
    }
    existing.last_event_source = Some(update.source);
    existing.last_event_at = Some(update.event_at);
    existing.updated_at = Some(chrono::Utc::now().naive_utc());
}

fn is_newer(existing: &Subscription, event_at: chrono::NaiveDateTime) -> bool {
    existing.last_event_at.is_none_or(|t| t < event_at)
}

#[async_trait]
impl SubscriptionRepo for InMemorySubscriptionRepo {
    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Option<Subscription>> {
        Ok(self.subscriptions.lock().unwrap().get(&user_id).cloned())
    }

    async fn get_by_stripe_customer_id(
        &self,
        customer_id: &str,
    ) -> AppResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn upsert_if_newer(&self, input: &SubscriptionUpsert) -> AppResult<WriteOutcome> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let now = chrono::Utc::now().naive_utc();

        match subscriptions.get_mut(&input.user_id) {
            Some(existing) => {
                if !is_newer(existing, input.event_at) {
                    return Ok(WriteOutcome::Stale);
                }
                existing.plan = input.plan;
                existing.status = input.status;
                if input.stripe_customer_id.is_some() {
                    existing.stripe_customer_id = input.stripe_customer_id.clone();
                }
                if input.stripe_subscription_id.is_some() {
                    existing.stripe_subscription_id = input.stripe_subscription_id.clone();
                }
                if input.revenuecat_app_user_id.is_some() {
                    existing.revenuecat_app_user_id = input.revenuecat_app_user_id.clone();
                }
                existing.current_period_end = input.current_period_end;
                existing.cancel_at_period_end = input.cancel_at_period_end;
                existing.last_event_source = Some(input.source);
                existing.last_event_at = Some(input.event_at);
                existing.updated_at = Some(now);
                Ok(WriteOutcome::Applied)
            }
            None => {
                subscriptions.insert(
                    input.user_id,
                    Subscription {
                        user_id: input.user_id,
                        plan: input.plan,
                        status: input.status,
                        stripe_customer_id: input.stripe_customer_id.clone(),
                        stripe_subscription_id: input.stripe_subscription_id.clone(),
                        revenuecat_app_user_id: input.revenuecat_app_user_id.clone(),
                        current_period_end: input.current_period_end,
                        cancel_at_period_end: input.cancel_at_period_end,
                        last_event_source: Some(input.source),
                        last_event_at: Some(input.event_at),
                        created_at: Some(now),
                        updated_at: Some(now),
                    },
                );
                Ok(WriteOutcome::Applied)
            }
        }
    }

    async fn update_by_stripe_subscription_id_if_newer(
        &self,
        stripe_subscription_id: &str,
        update: &SubscriptionUpdate,
    ) -> AppResult<WriteOutcome> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let Some(existing) = subscriptions
            .values_mut()
            .find(|s| s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id))
        else {
            return Ok(WriteOutcome::Missing);
        };

        if !is_newer(existing, update.event_at) {
            return Ok(WriteOutcome::Stale);
        }
        apply_update(existing, update);
        Ok(WriteOutcome::Applied)
    }

    async fn update_by_user_if_newer(
        &self,
        user_id: Uuid,
        update: &SubscriptionUpdate,
    ) -> AppResult<WriteOutcome> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let Some(existing) = subscriptions.get_mut(&user_id) else {
            return Ok(WriteOutcome::Missing);
        };

        if !is_newer(existing, update.event_at) {
            return Ok(WriteOutcome::Stale);
        }
        apply_update(existing, update);
        Ok(WriteOutcome::Applied)
    }
}

// ============================================================================
// InMemoryBillingEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryBillingEventRepo {
    pub seen: Mutex<HashSet<(crate::domain::entities::subscription::BillingProvider, String)>>,
}

impl InMemoryBillingEventRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BillingEventRepo for InMemoryBillingEventRepo {
    async fn try_record(
        &self,
        provider: crate::domain::entities::subscription::BillingProvider,
        event_id: &str,
    ) -> AppResult<bool> {
        Ok(self
            .seen
            .lock()
            .unwrap()
            .insert((provider, event_id.to_string())))
    }
}

// ============================================================================
// StubStripeGateway
// ============================================================================

/// Stub Stripe API gateway returning a preconfigured subscription.
#[derive(Default)]
pub struct StubStripeGateway {
    subscription: Option<StripeSubscription>,
}

impl StubStripeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(subscription: StripeSubscription) -> Self {
        Self {
            subscription: Some(subscription),
        }
    }
}

#[async_trait]
impl StripeGateway for StubStripeGateway {
    async fn get_subscription(&self, _subscription_id: &str) -> AppResult<StripeSubscription> {
        self.subscription.clone().ok_or(AppError::NotFound)
    }
}

// ============================================================================
// InMemoryRateLimiter
// ============================================================================

pub struct InMemoryRateLimiter {
    allow: bool,
}

impl InMemoryRateLimiter {
    /// A limiter that never rejects.
    pub fn permissive() -> Self {
        Self { allow: true }
    }

    /// A limiter that rejects everything.
    pub fn blocked() -> Self {
        Self { allow: false }
    }
}

#[async_trait]
impl RateLimiterTrait for InMemoryRateLimiter {
    async fn check(&self, _ip: &str) -> AppResult<()> {
        if self.allow {
            Ok(())
        } else {
            Err(AppError::RateLimited)
        }
    }
}
