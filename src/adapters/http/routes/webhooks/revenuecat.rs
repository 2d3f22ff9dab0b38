//! RevenueCat webhook handler (mobile billing aggregator).

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use secrecy::ExposeSecret;
use tracing::error;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::billing::timestamp_ms_to_naive,
    domain::entities::subscription::BillingProvider,
    infra::signatures::verify_hmac_hex,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/revenuecat", post(handle_revenuecat_webhook))
}

async fn handle_revenuecat_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    // Signature is only enforced when a shared secret is configured. Running
    // without one accepts unverified webhooks - a documented deployment risk.
    if let Some(secret) = &app_state.config.revenuecat_webhook_secret {
        let verified = headers
            .get("x-revenuecat-signature")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|sig| verify_hmac_hex(secret.expose_secret(), &body, sig));
        if !verified {
            return Err(AppError::InvalidCredentials);
        }
    } else {
        tracing::warn!("RevenueCat webhook accepted without signature verification");
    }

    let payload: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

    let event = &payload["event"];

    // Mirror the Stripe policy: acknowledge every verified delivery.
    if let Err(e) = process_event(&app_state, event).await {
        error!(
            error = %e,
            event_type = event["type"].as_str().unwrap_or(""),
            event_id = event["id"].as_str().unwrap_or(""),
            "RevenueCat webhook processing failed, acknowledging anyway"
        );
    }

    Ok(StatusCode::OK)
}

async fn process_event(app_state: &AppState, event: &serde_json::Value) -> AppResult<()> {
    let event_id = event["id"].as_str().unwrap_or("");
    let event_type = event["type"].as_str().unwrap_or("");

    if event_id.is_empty() {
        tracing::warn!("RevenueCat event without id, skipping");
        return Ok(());
    }

    // Sandbox transactions must not mutate real subscription state.
    if app_state.config.production && event["environment"].as_str() == Some("SANDBOX") {
        tracing::debug!(event_id, "Dropping sandbox RevenueCat event in production");
        return Ok(());
    }

    if !app_state
        .billing_use_cases
        .record_event_once(BillingProvider::Revenuecat, event_id)
        .await?
    {
        tracing::debug!(event_id, "Duplicate RevenueCat event, skipping");
        return Ok(());
    }

    let Some(event_at) = event["event_timestamp_ms"]
        .as_i64()
        .and_then(timestamp_ms_to_naive)
    else {
        tracing::warn!(event_id, "RevenueCat event without timestamp, skipping");
        return Ok(());
    };

    // This provider carries our user id natively as the app user id.
    let app_user_id = event["app_user_id"].as_str().unwrap_or("");
    let Ok(user_id) = Uuid::parse_str(app_user_id) else {
        tracing::debug!(event_id, app_user_id, "Unrecognized app user id, skipping");
        return Ok(());
    };

    match event_type {
        "INITIAL_PURCHASE" | "RENEWAL" => {
            let product_id = event["product_id"].as_str().unwrap_or("");
            let expires_at = event["expiration_at_ms"]
                .as_i64()
                .and_then(timestamp_ms_to_naive);
            app_state
                .billing_use_cases
                .apply_mobile_purchase(user_id, app_user_id, product_id, expires_at, event_at)
                .await?;
        }
        "CANCELLATION" | "EXPIRATION" => {
            app_state
                .billing_use_cases
                .apply_mobile_cancellation(user_id, event_at)
                .await?;
        }
        "BILLING_ISSUE" => {
            app_state
                .billing_use_cases
                .apply_mobile_billing_issue(user_id, event_at)
                .await?;
        }
        "SUBSCRIBER_ALIAS" => {
            // Identity-linking signal only, no subscription state change
            tracing::info!(event_id, app_user_id, "RevenueCat subscriber alias event");
        }
        _ => {
            tracing::debug!(event_type, "Unhandled RevenueCat event type");
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::infra::signatures::hmac_sha256_hex;
    use crate::test_utils::{TestAppStateBuilder, create_test_user, test_bearer_token};

    const SHARED_SECRET: &str = "rc_shared_secret";

    fn build_test_server(app_state: AppState) -> TestServer {
        TestServer::new(crate::adapters::http::routes::router().with_state(app_state)).unwrap()
    }

    fn purchase_event(event_id: &str, user_id: Uuid, timestamp_ms: i64) -> Value {
        json!({
            "api_version": "1.0",
            "event": {
                "id": event_id,
                "type": "INITIAL_PURCHASE",
                "environment": "PRODUCTION",
                "app_user_id": user_id.to_string(),
                "product_id": "rc_basic",
                "event_timestamp_ms": timestamp_ms,
                "expiration_at_ms": timestamp_ms + 2_592_000_000i64
            }
        })
    }

    #[tokio::test]
    async fn configured_secret_rejects_missing_signature() {
        let app_state = TestAppStateBuilder::new()
            .with_revenuecat_secret(SHARED_SECRET)
            .build();
        let server = build_test_server(app_state);

        let response = server.post("/webhooks/revenuecat").text("{}").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn configured_secret_rejects_bad_signature() {
        let app_state = TestAppStateBuilder::new()
            .with_revenuecat_secret(SHARED_SECRET)
            .build();
        let server = build_test_server(app_state);

        let response = server
            .post("/webhooks/revenuecat")
            .add_header("x-revenuecat-signature", "deadbeef")
            .text("{}")
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_signature_applies_purchase() {
        let user = create_test_user(|_| {});
        let app_state = TestAppStateBuilder::new()
            .with_user(user.clone())
            .with_revenuecat_secret(SHARED_SECRET)
            .build();
        let server = build_test_server(app_state);

        let body = purchase_event("rc_evt_1", user.id, 1_700_000_000_000).to_string();
        let response = server
            .post("/webhooks/revenuecat")
            .add_header(
                "x-revenuecat-signature",
                hmac_sha256_hex(SHARED_SECRET, &body),
            )
            .text(body)
            .await;
        response.assert_status_ok();

        let response = server
            .get("/billing/subscription")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        let json_body: Value = response.json();
        assert_eq!(json_body["subscription"]["plan"], json!("basic"));
        assert_eq!(json_body["subscription"]["status"], json!("active"));
    }

    #[tokio::test]
    async fn without_secret_webhooks_are_accepted_unverified() {
        let user = create_test_user(|_| {});
        let app_state = TestAppStateBuilder::new().with_user(user.clone()).build();
        let server = build_test_server(app_state);

        let body = purchase_event("rc_evt_1", user.id, 1_700_000_000_000).to_string();
        let response = server.post("/webhooks/revenuecat").text(body).await;
        response.assert_status_ok();

        let response = server
            .get("/billing/subscription")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        let json_body: Value = response.json();
        assert_eq!(json_body["subscription"]["status"], json!("active"));
    }

    #[tokio::test]
    async fn sandbox_event_is_dropped_in_production() {
        let user = create_test_user(|_| {});
        let app_state = TestAppStateBuilder::new()
            .with_user(user.clone())
            .production(true)
            .build();
        let server = build_test_server(app_state);

        let mut event = purchase_event("rc_evt_sandbox", user.id, 1_700_000_000_000);
        event["event"]["environment"] = json!("SANDBOX");
        let response = server
            .post("/webhooks/revenuecat")
            .text(event.to_string())
            .await;
        response.assert_status_ok();

        let response = server
            .get("/billing/subscription")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        let json_body: Value = response.json();
        assert!(json_body["subscription"].is_null());
    }

    #[tokio::test]
    async fn billing_issue_marks_past_due() {
        let user = create_test_user(|_| {});
        let app_state = TestAppStateBuilder::new().with_user(user.clone()).build();
        let server = build_test_server(app_state);

        let body = purchase_event("rc_evt_1", user.id, 1_700_000_000_000).to_string();
        server
            .post("/webhooks/revenuecat")
            .text(body)
            .await
            .assert_status_ok();

        let issue = json!({
            "event": {
                "id": "rc_evt_2",
                "type": "BILLING_ISSUE",
                "environment": "PRODUCTION",
                "app_user_id": user.id.to_string(),
                "event_timestamp_ms": 1_700_000_100_000i64
            }
        })
        .to_string();
        server
            .post("/webhooks/revenuecat")
            .text(issue)
            .await
            .assert_status_ok();

        let response = server
            .get("/billing/subscription")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        let json_body: Value = response.json();
        assert_eq!(json_body["subscription"]["status"], json!("past_due"));
    }

    #[tokio::test]
    async fn subscriber_alias_changes_nothing() {
        let user = create_test_user(|_| {});
        let app_state = TestAppStateBuilder::new().with_user(user.clone()).build();
        let server = build_test_server(app_state);

        let alias = json!({
            "event": {
                "id": "rc_evt_alias",
                "type": "SUBSCRIBER_ALIAS",
                "environment": "PRODUCTION",
                "app_user_id": user.id.to_string(),
                "event_timestamp_ms": 1_700_000_000_000i64
            }
        })
        .to_string();
        server
            .post("/webhooks/revenuecat")
            .text(alias)
            .await
            .assert_status_ok();

        let response = server
            .get("/billing/subscription")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        let json_body: Value = response.json();
        assert!(json_body["subscription"].is_null());
    }

    #[tokio::test]
    async fn duplicate_event_id_is_skipped() {
        let user = create_test_user(|_| {});
        let app_state = TestAppStateBuilder::new().with_user(user.clone()).build();
        let server = build_test_server(app_state);

        // First delivery applies a basic purchase
        let body = purchase_event("rc_evt_once", user.id, 1_700_000_000_000).to_string();
        server
            .post("/webhooks/revenuecat")
            .text(body)
            .await
            .assert_status_ok();

        // Redelivery of the same event id with different content is ignored
        let mut altered = purchase_event("rc_evt_once", user.id, 1_700_000_200_000);
        altered["event"]["product_id"] = json!("rc_enterprise");
        server
            .post("/webhooks/revenuecat")
            .text(altered.to_string())
            .await
            .assert_status_ok();

        let response = server
            .get("/billing/subscription")
            .authorization_bearer(&test_bearer_token(user.id))
            .await;
        let json_body: Value = response.json();
        assert_eq!(json_body["subscription"]["plan"], json!("basic"));
    }
}
