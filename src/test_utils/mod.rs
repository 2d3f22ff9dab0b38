//! In-memory mocks, fixture factories, and an AppState builder for tests.

pub mod app_state_builder;
pub mod billing_mocks;
pub mod factories;
pub mod membership_mocks;

pub use app_state_builder::{
    TEST_JWT_SECRET, TEST_STRIPE_WEBHOOK_SECRET, TestAppStateBuilder, test_bearer_token,
    test_plan_catalog,
};
pub use billing_mocks::*;
pub use factories::*;
pub use membership_mocks::*;
