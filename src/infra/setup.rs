use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        access::AccessResolver,
        billing::{BillingEventRepo, BillingUseCases, StripeGateway, SubscriptionRepo},
        membership::{MembershipRepo, MembershipUseCases, ProjectRepo, UserRepo},
    },
    infra::{
        config::AppConfig, postgres_persistence, rate_limit::RedisRateLimiter,
        stripe_client::StripeClient,
    },
};
use secrecy::ExposeSecret;
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);

    let rate_limiter = Arc::new(
        RedisRateLimiter::new(
            &config.redis_url,
            config.rate_limit_window_secs,
            config.rate_limit_per_ip,
        )
        .await?,
    );

    let project_repo = postgres_arc.clone() as Arc<dyn ProjectRepo>;
    let membership_repo = postgres_arc.clone() as Arc<dyn MembershipRepo>;
    let user_repo = postgres_arc.clone() as Arc<dyn UserRepo>;
    let subscription_repo = postgres_arc.clone() as Arc<dyn SubscriptionRepo>;
    let billing_event_repo = postgres_arc.clone() as Arc<dyn BillingEventRepo>;

    let access = AccessResolver::new(project_repo.clone(), membership_repo.clone());

    let membership_use_cases =
        MembershipUseCases::new(project_repo, membership_repo, user_repo, access);

    let stripe = Arc::new(StripeClient::new(
        config.stripe_secret_key.expose_secret().to_string(),
    )) as Arc<dyn StripeGateway>;

    let billing_use_cases = BillingUseCases::new(
        subscription_repo,
        billing_event_repo,
        stripe,
        config.plan_catalog(),
    );

    Ok(AppState {
        config: Arc::new(config),
        membership_use_cases: Arc::new(membership_use_cases),
        billing_use_cases: Arc::new(billing_use_cases),
        rate_limiter,
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "flowdeck_api=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false) // don't show target (module path)
        .with_level(true) // show log level
        .pretty(); // human-friendly, with colors

    // File (structured JSON logs)
    let file = File::create("app.log").expect("cannot create log file");
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
