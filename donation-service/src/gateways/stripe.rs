//! Stripe payment intents.

use super::GatewayCommand;
use crate::services::metrics::record_gateway_command;
use crate::utils::verify_hmac_sha256_hex;
use serde::Deserialize;
use service_core::error::AppError;
use std::collections::HashMap;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Metadata key carrying the donation id on intents created for a donation.
pub const DONATION_ID_METADATA_KEY: &str = "donation_id";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentIntentError {
    #[error("Unhandled payment intent status: {0}")]
    UnhandledStatus(String),

    #[error("Payment intent {0} requires action but has no redirect URL")]
    MissingRedirectUrl(String),

    #[error("Malformed Stripe-Signature header")]
    MalformedSignature,

    #[error("Webhook signature does not match")]
    SignatureMismatch,
}

impl From<PaymentIntentError> for AppError {
    fn from(err: PaymentIntentError) -> Self {
        match err {
            PaymentIntentError::MalformedSignature | PaymentIntentError::SignatureMismatch => {
                AppError::Unauthorized(err.into())
            }
            _ => AppError::BadRequest(err.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub next_action: Option<NextAction>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextAction {
    #[serde(default)]
    pub redirect_to_url: Option<RedirectToUrl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedirectToUrl {
    pub url: Option<String>,
}

impl PaymentIntent {
    pub fn next_action_redirect_url(&self) -> Option<&str> {
        self.next_action
            .as_ref()
            .and_then(|action| action.redirect_to_url.as_ref())
            .and_then(|redirect| redirect.url.as_deref())
    }

    /// Donation id recorded in the intent metadata, if any.
    pub fn donation_id(&self) -> Option<i64> {
        self.metadata
            .get(DONATION_ID_METADATA_KEY)
            .and_then(|id| id.trim().parse().ok())
    }
}

/// Webhook event envelope. Only payment-intent events are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    pub fn is_payment_intent(&self) -> bool {
        self.event_type.starts_with("payment_intent.")
    }

    pub fn payment_intent(&self) -> Result<PaymentIntent, serde_json::Error> {
        PaymentIntent::deserialize(&self.data.object)
    }
}

/// Normalize an intent's status into the next payment command.
pub fn handle_payment_intent_status(
    intent: &PaymentIntent,
) -> Result<GatewayCommand, PaymentIntentError> {
    let result = match intent.status.as_str() {
        "requires_action" => intent
            .next_action_redirect_url()
            .map(|url| GatewayCommand::RedirectOffsite {
                redirect_url: url.to_string(),
            })
            .ok_or_else(|| PaymentIntentError::MissingRedirectUrl(intent.id.clone())),
        "succeeded" | "processing" => Ok(GatewayCommand::PaymentProcessing {
            gateway_transaction_id: intent.id.clone(),
        }),
        other => Err(PaymentIntentError::UnhandledStatus(other.to_string())),
    };

    match &result {
        Ok(command) => record_gateway_command("stripe", command.name()),
        Err(_) => record_gateway_command("stripe", "error"),
    }
    result
}

/// Check a `t=<timestamp>,v1=<hex>` signature header against
/// `HMAC-SHA256(secret, "<timestamp>.<payload>")`. Any matching `v1` entry
/// is accepted.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    header: &str,
) -> Result<(), PaymentIntentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentIntentError::MalformedSignature)?;
    if signatures.is_empty() {
        return Err(PaymentIntentError::MalformedSignature);
    }

    let mut signed = Vec::with_capacity(timestamp.len() + 1 + payload.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(payload);

    if signatures
        .iter()
        .any(|signature| verify_hmac_sha256_hex(secret.as_bytes(), &signed, signature))
    {
        Ok(())
    } else {
        Err(PaymentIntentError::SignatureMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hmac_sha256_hex;

    fn intent(status: &str) -> PaymentIntent {
        PaymentIntent {
            id: "pi_3MtwBwLkdIwHu7ix28a3tqPa".to_string(),
            status: status.to_string(),
            next_action: None,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn requires_action_redirects_to_the_next_action_url() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_1",
            "status": "requires_action",
            "next_action": {
                "type": "redirect_to_url",
                "redirect_to_url": { "url": "https://hooks.stripe.com/redirect/authenticate/src_1" }
            }
        }))
        .unwrap();

        assert_eq!(
            handle_payment_intent_status(&intent).unwrap(),
            GatewayCommand::RedirectOffsite {
                redirect_url: "https://hooks.stripe.com/redirect/authenticate/src_1".to_string()
            }
        );
    }

    #[test]
    fn requires_action_without_url_is_an_error() {
        assert_eq!(
            handle_payment_intent_status(&intent("requires_action")).unwrap_err(),
            PaymentIntentError::MissingRedirectUrl("pi_3MtwBwLkdIwHu7ix28a3tqPa".to_string())
        );
    }

    #[test]
    fn succeeded_and_processing_carry_the_intent_id() {
        for status in ["succeeded", "processing"] {
            assert_eq!(
                handle_payment_intent_status(&intent(status)).unwrap(),
                GatewayCommand::PaymentProcessing {
                    gateway_transaction_id: "pi_3MtwBwLkdIwHu7ix28a3tqPa".to_string()
                }
            );
        }
    }

    #[test]
    fn other_statuses_name_the_status() {
        let err = handle_payment_intent_status(&intent("requires_capture")).unwrap_err();
        assert_eq!(err.to_string(), "Unhandled payment intent status: requires_capture");
        assert!(matches!(AppError::from(err), AppError::BadRequest(_)));
    }

    #[test]
    fn webhook_events_expose_their_payment_intent() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_1", "status": "succeeded", "metadata": { "donation_id": "5" } } }
        }))
        .unwrap();

        assert!(event.is_payment_intent());
        let intent = event.payment_intent().unwrap();
        assert_eq!(intent.id, "pi_1");
        assert_eq!(intent.donation_id(), Some(5));
    }

    #[test]
    fn donation_id_comes_from_metadata() {
        let mut intent = intent("succeeded");
        assert_eq!(intent.donation_id(), None);
        intent
            .metadata
            .insert(DONATION_ID_METADATA_KEY.to_string(), "42".to_string());
        assert_eq!(intent.donation_id(), Some(42));
    }

    #[test]
    fn signature_header_is_verified() {
        let payload = br#"{"id":"evt_1"}"#;
        let mut signed = b"1700000000.".to_vec();
        signed.extend_from_slice(payload);
        let signature = hmac_sha256_hex(b"whsec_test", &[signed.as_slice()]).unwrap();

        let header = format!("t=1700000000,v1=deadbeef,v1={}", signature);
        assert_eq!(verify_signature("whsec_test", payload, &header), Ok(()));
        assert_eq!(
            verify_signature("whsec_other", payload, &header),
            Err(PaymentIntentError::SignatureMismatch)
        );
        assert_eq!(
            verify_signature("whsec_test", payload, "v1=abc"),
            Err(PaymentIntentError::MalformedSignature)
        );
    }
}
