//! Test app state builder for HTTP-level integration testing.
//!
//! Creates a minimal `AppState` backed by in-memory mocks so route handlers
//! can be exercised through `axum_test::TestServer` without Postgres, Redis,
//! or the Stripe API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use secrecy::SecretString;
use time::Duration;
use url::Url;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    application::jwt,
    application::use_cases::{
        access::AccessResolver,
        billing::{BillingUseCases, PlanCatalog, StripeSubscription},
        membership::MembershipUseCases,
    },
    domain::entities::{
        membership::Membership, project::Project, subscription::Subscription,
        subscription::SubscriptionPlan, user::User,
    },
    infra::{RateLimiterTrait, config::AppConfig},
    test_utils::{
        InMemoryBillingEventRepo, InMemoryMembershipRepo, InMemoryProjectRepo, InMemoryRateLimiter,
        InMemorySubscriptionRepo, InMemoryUserRepo, StubStripeGateway,
    },
};

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_STRIPE_WEBHOOK_SECRET: &str = "whsec_test123secret456";

/// Issue a bearer token accepted by app states built with `TestAppStateBuilder`.
pub fn test_bearer_token(user_id: Uuid) -> String {
    jwt::issue(
        user_id,
        &SecretString::new(TEST_JWT_SECRET.into()),
        Duration::hours(1),
    )
    .expect("test token should issue")
}

/// The catalog wired into test app states: `price_*` ids for Stripe and
/// `rc_*` product ids for RevenueCat.
pub fn test_plan_catalog() -> PlanCatalog {
    PlanCatalog::new(
        vec![
            ("price_basic".to_string(), SubscriptionPlan::Basic),
            ("price_pro".to_string(), SubscriptionPlan::Pro),
            ("price_enterprise".to_string(), SubscriptionPlan::Enterprise),
        ],
        vec![
            ("rc_basic".to_string(), SubscriptionPlan::Basic),
            ("rc_pro".to_string(), SubscriptionPlan::Pro),
            ("rc_enterprise".to_string(), SubscriptionPlan::Enterprise),
        ],
    )
}

/// Builder for creating `AppState` with in-memory mocks for testing.
///
/// # Example
///
/// ```ignore
/// let owner = create_test_user(|_| {});
/// let project = create_test_project(owner.id, |_| {});
///
/// let app_state = TestAppStateBuilder::new()
///     .with_user(owner)
///     .with_project(project)
///     .build();
/// ```
pub struct TestAppStateBuilder {
    users: Vec<User>,
    projects: Vec<Project>,
    memberships: Vec<Membership>,
    subscriptions: Vec<Subscription>,
    stripe_subscription: Option<StripeSubscription>,
    revenuecat_secret: Option<String>,
    production: bool,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            users: vec![],
            projects: vec![],
            memberships: vec![],
            subscriptions: vec![],
            stripe_subscription: None,
            revenuecat_secret: None,
            production: false,
        }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    pub fn with_project(mut self, project: Project) -> Self {
        self.projects.push(project);
        self
    }

    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.memberships.push(membership);
        self
    }

    pub fn with_subscription(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    /// Configure the subscription the stub Stripe gateway returns.
    pub fn with_stripe_subscription(mut self, subscription: StripeSubscription) -> Self {
        self.stripe_subscription = Some(subscription);
        self
    }

    /// Enable RevenueCat signature verification with a shared secret.
    pub fn with_revenuecat_secret(mut self, secret: &str) -> Self {
        self.revenuecat_secret = Some(secret.to_string());
        self
    }

    /// Flag the deployment as production (drops sandbox billing events).
    pub fn production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Build the AppState with all configured mocks.
    pub fn build(self) -> AppState {
        let project_repo = Arc::new(InMemoryProjectRepo::with_projects(self.projects));
        let membership_repo = Arc::new(InMemoryMembershipRepo::with_memberships(self.memberships));
        let user_repo = Arc::new(InMemoryUserRepo::with_users(self.users));
        let subscription_repo =
            Arc::new(InMemorySubscriptionRepo::with_subscriptions(self.subscriptions));
        let billing_event_repo = Arc::new(InMemoryBillingEventRepo::new());

        let stripe = Arc::new(match self.stripe_subscription {
            Some(subscription) => StubStripeGateway::with_subscription(subscription),
            None => StubStripeGateway::new(),
        });

        let access = AccessResolver::new(project_repo.clone(), membership_repo.clone());
        let membership_use_cases =
            MembershipUseCases::new(project_repo, membership_repo, user_repo, access);

        let billing_use_cases = BillingUseCases::new(
            subscription_repo,
            billing_event_repo,
            stripe,
            test_plan_catalog(),
        );

        // Create minimal config for testing
        let config = Arc::new(AppConfig {
            jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
            access_token_ttl: Duration::hours(24),
            app_origin: Url::parse("http://localhost:3000").unwrap(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            bind_addr: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(),
            redis_url: String::new(),
            rate_limit_window_secs: 60,
            rate_limit_per_ip: 60,
            database_url: String::new(),
            trust_proxy: false,
            stripe_secret_key: SecretString::new("sk_test_key".into()),
            stripe_webhook_secret: SecretString::new(TEST_STRIPE_WEBHOOK_SECRET.into()),
            revenuecat_webhook_secret: self
                .revenuecat_secret
                .map(|s| SecretString::new(s.into())),
            production: self.production,
            stripe_price_basic: "price_basic".to_string(),
            stripe_price_pro: "price_pro".to_string(),
            stripe_price_enterprise: "price_enterprise".to_string(),
            revenuecat_product_basic: "rc_basic".to_string(),
            revenuecat_product_pro: "rc_pro".to_string(),
            revenuecat_product_enterprise: "rc_enterprise".to_string(),
        });

        let rate_limiter: Arc<dyn RateLimiterTrait> = Arc::new(InMemoryRateLimiter::permissive());

        AppState {
            config,
            membership_use_cases: Arc::new(membership_use_cases),
            billing_use_cases: Arc::new(billing_use_cases),
            rate_limiter,
        }
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
