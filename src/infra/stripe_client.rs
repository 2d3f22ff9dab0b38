use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::billing::{StripeGateway, StripeSubscription};
use crate::infra::signatures::constant_time_compare;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum age of a webhook signature timestamp (replay protection).
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: Client::new(),
            secret_key,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:", self.secret_key));
        format!("Basic {}", encoded)
    }

    // ========================================================================
    // Webhook signature verification
    // ========================================================================

    /// Verify a `stripe-signature` header ("t=timestamp,v1=signature,...")
    /// against the raw request body.
    pub fn verify_webhook_signature(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
    ) -> AppResult<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() != 2 {
                continue;
            }
            match kv[0] {
                "t" => timestamp = Some(kv[1]),
                "v1" => signatures.push(kv[1]),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::InvalidInput("Missing timestamp in signature".into()))?;

        if signatures.is_empty() {
            return Err(AppError::InvalidInput("Missing signature".into()));
        }

        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        for sig in signatures {
            if constant_time_compare(sig, &expected) {
                let ts: i64 = timestamp
                    .parse()
                    .map_err(|_| AppError::InvalidInput("Invalid timestamp".into()))?;
                let now = chrono::Utc::now().timestamp();
                if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
                    return Err(AppError::InvalidInput("Timestamp too old".into()));
                }
                return Ok(());
            }
        }

        Err(AppError::InvalidInput("Invalid signature".into()))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::InvalidInput(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }
            return Err(AppError::Internal(format!(
                "Stripe API returned {}",
                status
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| AppError::Internal(format!("Failed to parse Stripe response: {}", e)))
    }
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn get_subscription(&self, subscription_id: &str) -> AppResult<StripeSubscription> {
        let response = self
            .client
            .get(format!(
                "{}/subscriptions/{}",
                STRIPE_API_BASE, subscription_id
            ))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        let object: StripeSubscriptionObject = self.handle_response(response).await?;
        Ok(object.into())
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeSubscriptionObject {
    id: String,
    customer: String,
    status: String,
    #[serde(default)]
    cancel_at_period_end: bool,
    current_period_end: Option<i64>,
    items: StripeSubscriptionItems,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItems {
    #[serde(default)]
    data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    price: StripePrice,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    id: String,
}

impl From<StripeSubscriptionObject> for StripeSubscription {
    fn from(object: StripeSubscriptionObject) -> Self {
        let price_id = object
            .items
            .data
            .first()
            .map(|item| item.price.id.clone())
            .unwrap_or_default();
        StripeSubscription {
            id: object.id,
            customer_id: object.customer,
            status: object.status,
            price_id,
            current_period_end: object.current_period_end,
            cancel_at_period_end: object.cancel_at_period_end,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const SECRET: &str = "whsec_test123secret456";

    fn compute_signature(payload: &str, secret: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac =
            Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signature_header(payload: &str, secret: &str, timestamp: i64) -> String {
        format!(
            "t={},v1={}",
            timestamp,
            compute_signature(payload, secret, timestamp)
        )
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let now = chrono::Utc::now().timestamp();
        let header = signature_header(payload, SECRET, now);
        assert!(StripeClient::verify_webhook_signature(payload, &header, SECRET).is_ok());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let now = chrono::Utc::now().timestamp();
        let header = signature_header(payload, "whsec_wrong", now);
        assert!(StripeClient::verify_webhook_signature(payload, &header, SECRET).is_err());
    }

    #[test]
    fn modified_payload_is_rejected() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let now = chrono::Utc::now().timestamp();
        let header = signature_header(payload, SECRET, now);
        let tampered = r#"{"type":"checkout.session.completed","extra":true}"#;
        assert!(StripeClient::verify_webhook_signature(tampered, &header, SECRET).is_err());
    }

    #[test]
    fn old_timestamp_is_rejected() {
        let payload = r#"{"type":"checkout.session.completed"}"#;
        let old = chrono::Utc::now().timestamp() - 600;
        let header = signature_header(payload, SECRET, old);
        assert!(StripeClient::verify_webhook_signature(payload, &header, SECRET).is_err());
    }

    #[test]
    fn missing_timestamp_is_rejected() {
        assert!(
            StripeClient::verify_webhook_signature("{}", "v1=somesignature", SECRET).is_err()
        );
    }

    #[test]
    fn missing_signature_is_rejected() {
        assert!(StripeClient::verify_webhook_signature("{}", "t=1234567890", SECRET).is_err());
    }

    #[test]
    fn malformed_header_is_rejected() {
        assert!(StripeClient::verify_webhook_signature("{}", "garbage", SECRET).is_err());
    }

    #[test]
    fn subscription_object_extracts_first_price() {
        let json = r#"{
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "cancel_at_period_end": false,
            "current_period_end": 1900000000,
            "items": {"data": [{"price": {"id": "price_pro"}}]}
        }"#;
        let object: StripeSubscriptionObject = serde_json::from_str(json).unwrap();
        let sub: StripeSubscription = object.into();
        assert_eq!(sub.price_id, "price_pro");
        assert_eq!(sub.customer_id, "cus_1");
        assert_eq!(sub.current_period_end, Some(1900000000));
    }
}
