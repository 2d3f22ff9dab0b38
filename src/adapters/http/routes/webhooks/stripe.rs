//! Stripe webhook handler (web checkout and subscription lifecycle).

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
    application::use_cases::billing::timestamp_to_naive,
    domain::entities::subscription::{BillingProvider, SubscriptionStatus},
    infra::stripe_client::StripeClient,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

async fn handle_stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidInput("Missing Stripe signature".into()))?;

    StripeClient::verify_webhook_signature(
        &body,
        signature,
        app_state.config.stripe_webhook_secret.expose_secret(),
    )?;

    let event: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

    // Past this point the delivery is acknowledged no matter what: a transient
    // store failure must not trigger an infinite provider-side retry loop.
    if let Err(e) = process_event(&app_state, &event).await {
        error!(
            error = %e,
            event_type = event["type"].as_str().unwrap_or(""),
            event_id = event["id"].as_str().unwrap_or(""),
            "Stripe webhook processing failed, acknowledging anyway"
        );
    }

    Ok(StatusCode::OK)
}

async fn process_event(app_state: &AppState, event: &serde_json::Value) -> AppResult<()> {
    let event_id = event["id"].as_str().unwrap_or("");
    let event_type = event["type"].as_str().unwrap_or("");

    if event_id.is_empty() {
        tracing::warn!("Stripe event without id, skipping");
        return Ok(());
    }

    // Idempotency gate: the first delivery to record the id applies the event.
    if !app_state
        .billing_use_cases
        .record_event_once(BillingProvider::Stripe, event_id)
        .await?
    {
        tracing::debug!(event_id, "Duplicate Stripe event, skipping");
        return Ok(());
    }

    let Some(event_at) = event["created"].as_i64().and_then(timestamp_to_naive) else {
        tracing::warn!(event_id, "Stripe event without created timestamp, skipping");
        return Ok(());
    };

    match event_type {
        "checkout.session.completed" => {
            let session = &event["data"]["object"];
            let user_id = session["metadata"]["user_id"]
                .as_str()
                .or_else(|| session["client_reference_id"].as_str());
            let subscription_id = session["subscription"].as_str();

            let (user_id_str, subscription_id) = match (user_id, subscription_id) {
                (Some(u), Some(s)) => (u, s),
                _ => {
                    // One-time payment or missing data - nothing to process
                    tracing::debug!(
                        event_id,
                        "checkout.session.completed without subscription or user reference"
                    );
                    return Ok(());
                }
            };

            let Ok(user_id) = Uuid::parse_str(user_id_str) else {
                tracing::debug!(event_id, user_id_str, "Invalid user id in checkout session");
                return Ok(());
            };

            app_state
                .billing_use_cases
                .apply_checkout_completed(user_id, subscription_id, event_at)
                .await?;
        }
        "customer.subscription.updated" => {
            let subscription = &event["data"]["object"];
            let stripe_sub_id = subscription["id"].as_str().unwrap_or("");
            let customer_id = subscription["customer"].as_str().unwrap_or("");
            let status =
                SubscriptionStatus::from_stripe(subscription["status"].as_str().unwrap_or(""));
            // First item's price drives plan upgrades/downgrades
            let price_id = subscription["items"]["data"]
                .as_array()
                .and_then(|items| items.first())
                .and_then(|item| item["price"]["id"].as_str());
            let current_period_end = subscription["current_period_end"]
                .as_i64()
                .and_then(timestamp_to_naive);
            let cancel_at_period_end = subscription["cancel_at_period_end"]
                .as_bool()
                .unwrap_or(false);

            app_state
                .billing_use_cases
                .apply_stripe_subscription_updated(
                    customer_id,
                    stripe_sub_id,
                    status,
                    price_id,
                    current_period_end,
                    cancel_at_period_end,
                    event_at,
                )
                .await?;
        }
        "customer.subscription.deleted" => {
            let stripe_sub_id = event["data"]["object"]["id"].as_str().unwrap_or("");
            app_state
                .billing_use_cases
                .apply_stripe_subscription_deleted(stripe_sub_id, event_at)
                .await?;
        }
        _ => {
            // Accepted and ignored: stays forward-compatible with new event types
            tracing::debug!(event_type, "Unhandled Stripe webhook event type");
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
