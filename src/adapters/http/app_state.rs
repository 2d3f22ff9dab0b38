use std::sync::Arc;

use crate::{
    application::use_cases::{billing::BillingUseCases, membership::MembershipUseCases},
    infra::RateLimiterTrait,
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub membership_use_cases: Arc<MembershipUseCases>,
    pub billing_use_cases: Arc<BillingUseCases>,
    pub rate_limiter: Arc<dyn RateLimiterTrait>,
}
