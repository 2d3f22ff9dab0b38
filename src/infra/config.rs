use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use time::Duration;
use url::Url;

use crate::application::use_cases::billing::PlanCatalog;
use crate::domain::entities::subscription::SubscriptionPlan;

pub struct AppConfig {
    pub jwt_secret: SecretString,
    pub access_token_ttl: Duration,
    pub app_origin: Url,
    pub cors_origin: HeaderValue,
    pub bind_addr: SocketAddr,
    pub redis_url: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_per_ip: u64,
    pub database_url: String,
    /// Whether to trust X-Forwarded-For headers. Set to true when behind a reverse proxy (Caddy, nginx).
    /// SECURITY: Only enable this when the API is not directly exposed to the internet.
    pub trust_proxy: bool,
    /// Stripe API secret key (sk_...).
    pub stripe_secret_key: SecretString,
    /// Stripe webhook signing secret (whsec_...).
    pub stripe_webhook_secret: SecretString,
    /// Optional RevenueCat shared secret. When unset, RevenueCat webhooks are
    /// accepted unverified - acceptable for development, a risk in production.
    pub revenuecat_webhook_secret: Option<SecretString>,
    /// Production deployments drop sandbox billing events.
    pub production: bool,
    // Fixed price-to-plan table for Stripe checkout.
    pub stripe_price_basic: String,
    pub stripe_price_pro: String,
    pub stripe_price_enterprise: String,
    // Fixed product-to-plan table for RevenueCat.
    pub revenuecat_product_basic: String,
    pub revenuecat_product_pro: String,
    pub revenuecat_product_enterprise: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let jwt_secret: SecretString = SecretString::new(get_env::<String>("JWT_SECRET").into());

        let access_token_ttl_secs: i64 = get_env_default("ACCESS_TOKEN_TTL_SECS", 86_400);

        let app_origin: Url = get_env("APP_ORIGIN");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");

        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:3001".parse().unwrap());
        let redis_url: String = get_env_default("REDIS_URL", "redis://127.0.0.1:6379".to_string());
        let rate_limit_window_secs: u64 = get_env_default("RATE_LIMIT_WINDOW_SECS", 60);
        let rate_limit_per_ip: u64 = get_env_default("RATE_LIMIT_PER_IP", 60);
        let database_url: String = get_env("DATABASE_URL");
        // Default to false for security - must explicitly enable when behind a trusted proxy
        let trust_proxy: bool = get_env_default("TRUST_PROXY", false);

        let stripe_secret_key: SecretString =
            SecretString::new(get_env::<String>("STRIPE_SECRET_KEY").into());
        let stripe_webhook_secret: SecretString =
            SecretString::new(get_env::<String>("STRIPE_WEBHOOK_SECRET").into());
        let revenuecat_webhook_secret: Option<SecretString> =
            std::env::var("REVENUECAT_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .map(|s| SecretString::new(s.into()));
        let production: bool = get_env_default("PRODUCTION", false);

        let stripe_price_basic: String = get_env("STRIPE_PRICE_BASIC");
        let stripe_price_pro: String = get_env("STRIPE_PRICE_PRO");
        let stripe_price_enterprise: String = get_env("STRIPE_PRICE_ENTERPRISE");
        let revenuecat_product_basic: String = get_env("REVENUECAT_PRODUCT_BASIC");
        let revenuecat_product_pro: String = get_env("REVENUECAT_PRODUCT_PRO");
        let revenuecat_product_enterprise: String = get_env("REVENUECAT_PRODUCT_ENTERPRISE");

        Self {
            jwt_secret,
            access_token_ttl: Duration::seconds(access_token_ttl_secs),
            app_origin,
            cors_origin,
            bind_addr,
            redis_url,
            rate_limit_window_secs,
            rate_limit_per_ip,
            database_url,
            trust_proxy,
            stripe_secret_key,
            stripe_webhook_secret,
            revenuecat_webhook_secret,
            production,
            stripe_price_basic,
            stripe_price_pro,
            stripe_price_enterprise,
            revenuecat_product_basic,
            revenuecat_product_pro,
            revenuecat_product_enterprise,
        }
    }

    /// The fixed provider-reference → plan tables used by the reconciler.
    pub fn plan_catalog(&self) -> PlanCatalog {
        PlanCatalog::new(
            vec![
                (self.stripe_price_basic.clone(), SubscriptionPlan::Basic),
                (self.stripe_price_pro.clone(), SubscriptionPlan::Pro),
                (
                    self.stripe_price_enterprise.clone(),
                    SubscriptionPlan::Enterprise,
                ),
            ],
            vec![
                (
                    self.revenuecat_product_basic.clone(),
                    SubscriptionPlan::Basic,
                ),
                (self.revenuecat_product_pro.clone(), SubscriptionPlan::Pro),
                (
                    self.revenuecat_product_enterprise.clone(),
                    SubscriptionPlan::Enterprise,
                ),
            ],
        )
    }
}
