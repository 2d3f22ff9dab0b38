use axum::{
    Json, Router, extract::State, http::HeaderMap, response::IntoResponse, routing::get,
};
use serde::Serialize;

use crate::{
    adapters::http::app_state::AppState,
    adapters::http::routes::current_user,
    app_error::AppResult,
    domain::entities::subscription::{Subscription, SubscriptionPlan, SubscriptionStatus},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/subscription", get(get_subscription))
}

#[derive(Serialize)]
struct SubscriptionBody {
    plan: SubscriptionPlan,
    status: SubscriptionStatus,
    current_period_end: Option<i64>,
    cancel_at_period_end: bool,
}

impl From<Subscription> for SubscriptionBody {
    fn from(subscription: Subscription) -> Self {
        Self {
            plan: subscription.plan,
            status: subscription.status,
            current_period_end: subscription
                .current_period_end
                .map(|t| t.and_utc().timestamp()),
            cancel_at_period_end: subscription.cancel_at_period_end,
        }
    }
}

#[derive(Serialize)]
struct SubscriptionResponse {
    success: bool,
    subscription: Option<SubscriptionBody>,
}

/// The caller's canonical subscription record, or null before any purchase.
async fn get_subscription(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let user_id = current_user(&headers, &app_state)?;

    let subscription = app_state.billing_use_cases.get_subscription(user_id).await?;

    Ok(Json(SubscriptionResponse {
        success: true,
        subscription: subscription.map(SubscriptionBody::from),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::test_utils::{
        TestAppStateBuilder, create_test_subscription, create_test_user, test_bearer_token,
    };

    fn build_test_server(app_state: AppState) -> TestServer {
        TestServer::new(super::super::router().with_state(app_state)).unwrap()
    }

    #[tokio::test]
    async fn subscription_read_requires_authentication() {
        let app_state = TestAppStateBuilder::new().build();
        let server = build_test_server(app_state);

        let response = server.get("/billing/subscription").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn user_without_subscription_gets_null() {
        let user = create_test_user(|_| {});
        let app_state = TestAppStateBuilder::new().with_user(user.clone()).build();
        let server = build_test_server(app_state);

        let response = server
            .get("/billing/subscription")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["success"], json!(true));
        assert!(body["subscription"].is_null());
    }

    #[tokio::test]
    async fn subscriber_sees_their_record() {
        let user = create_test_user(|_| {});
        let subscription = create_test_subscription(user.id, |s| {
            s.plan = SubscriptionPlan::Pro;
            s.status = SubscriptionStatus::Active;
        });

        let app_state = TestAppStateBuilder::new()
            .with_user(user.clone())
            .with_subscription(subscription)
            .build();
        let server = build_test_server(app_state);

        let response = server
            .get("/billing/subscription")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["subscription"]["plan"], json!("pro"));
        assert_eq!(body["subscription"]["status"], json!("active"));
    }
}
