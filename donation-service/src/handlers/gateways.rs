//! Payment gateway webhooks.

use crate::gateways::stripe::{self, handle_payment_intent_status, PaymentIntent, WebhookEvent};
use crate::gateways::GatewayCommand;
use crate::models::Donation;
use crate::startup::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use secrecy::ExposeSecret;
use serde::Serialize;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<GatewayCommand>,
    pub updated: bool,
}

impl WebhookResponse {
    fn ignored() -> Self {
        Self {
            received: true,
            donation_id: None,
            action: None,
            updated: false,
        }
    }
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    if let Some(secret) = &state.config.stripe.webhook_secret {
        let signature = headers
            .get(stripe::SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::warn!("Missing Stripe-Signature header");
                AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature"))
            })?;

        stripe::verify_signature(secret.expose_secret(), &body, signature).map_err(|e| {
            tracing::warn!(error = %e, "Invalid webhook signature");
            AppError::from(e)
        })?;
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse webhook event");
        AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload"))
    })?;

    if !event.is_payment_intent() {
        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
        return Ok(Json(WebhookResponse::ignored()));
    }

    let intent = event.payment_intent().map_err(|e| {
        tracing::error!(error = %e, event_id = %event.id, "Malformed payment intent");
        AppError::BadRequest(anyhow::anyhow!("Invalid payment intent payload"))
    })?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        intent_id = %intent.id,
        intent_status = %intent.status,
        "Received Stripe webhook"
    );

    let command = handle_payment_intent_status(&intent)?;
    let mut donation = resolve_donation(&state, &intent).await?;

    let updated = command.apply_to(&mut donation);
    if updated {
        state.donations.update(&donation).await?;
    }

    tracing::info!(
        donation_id = ?donation.id,
        command = command.name(),
        updated,
        "Applied gateway command"
    );

    Ok(Json(WebhookResponse {
        received: true,
        donation_id: donation.id,
        action: Some(command),
        updated,
    }))
}

/// The donation named by the intent metadata, falling back to the donation
/// that already stores the intent id.
async fn resolve_donation(state: &AppState, intent: &PaymentIntent) -> Result<Donation, AppError> {
    let mut donation = match intent.donation_id() {
        Some(id) => state.donations.get_by_id(id).await?,
        None => None,
    };
    if donation.is_none() {
        donation = state.donations.get_by_gateway_transaction_id(&intent.id).await?;
    }

    donation.ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!(
            "No donation found for payment intent {}",
            intent.id
        ))
    })
}
