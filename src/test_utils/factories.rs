//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible
//! defaults. Use the closure parameter to override specific fields as needed.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    membership::{Membership, MembershipStatus, ProjectRole},
    project::Project,
    subscription::{BillingProvider, Subscription, SubscriptionPlan, SubscriptionStatus},
    user::User,
};

pub fn test_datetime() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

pub fn test_datetime_offset_days(days: i64) -> NaiveDateTime {
    test_datetime() + chrono::Duration::days(days)
}

/// Create a test user with sensible defaults.
pub fn create_test_user(overrides: impl FnOnce(&mut User)) -> User {
    let id = Uuid::new_v4();
    let mut user = User {
        id,
        email: format!("user-{}@example.com", id.simple()),
        display_name: None,
        created_at: Some(test_datetime()),
    };
    overrides(&mut user);
    user
}

/// Create a test project owned by the given user.
pub fn create_test_project(owner_user_id: Uuid, overrides: impl FnOnce(&mut Project)) -> Project {
    let mut project = Project {
        id: Uuid::new_v4(),
        owner_user_id,
        name: "Test Project".to_string(),
        description: Some("A project for testing".to_string()),
        created_at: Some(test_datetime()),
    };
    overrides(&mut project);
    project
}

/// Create a test membership row with sensible defaults (accepted viewer).
pub fn create_test_membership(
    project_id: Uuid,
    user_id: Uuid,
    overrides: impl FnOnce(&mut Membership),
) -> Membership {
    let mut membership = Membership {
        id: Uuid::new_v4(),
        project_id,
        user_id,
        role: ProjectRole::Viewer,
        status: MembershipStatus::Accepted,
        invited_by: Uuid::new_v4(),
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut membership);
    membership
}

/// Create a test subscription with sensible defaults (active basic via Stripe).
pub fn create_test_subscription(
    user_id: Uuid,
    overrides: impl FnOnce(&mut Subscription),
) -> Subscription {
    let mut subscription = Subscription {
        user_id,
        plan: SubscriptionPlan::Basic,
        status: SubscriptionStatus::Active,
        stripe_customer_id: Some(format!("cus_test{}", user_id.simple())),
        stripe_subscription_id: Some(format!("sub_test{}", user_id.simple())),
        revenuecat_app_user_id: None,
        current_period_end: Some(test_datetime_offset_days(30)),
        cancel_at_period_end: false,
        last_event_source: Some(BillingProvider::Stripe),
        last_event_at: Some(test_datetime()),
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut subscription);
    subscription
}
