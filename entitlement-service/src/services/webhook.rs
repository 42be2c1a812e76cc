//! Billing webhook verification and parsing.
//!
//! Deliveries carry a `Stripe-Signature: t=<unix>,v1=<hex>` header where the
//! signature is HMAC-SHA256 over `"{t}.{raw body}"`. Verified payloads are
//! turned into [`BillingEvent`] variants before any reconciliation runs.

use crate::models::{BillingEvent, BillingPeriod, SubscriptionStatus};
use crate::services::billing::stripe::{StripeList, StripePrice, StripeSubscription};
use crate::services::clock::Clock;
use chrono::DateTime;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::error::AppError;
use service_core::utils::signature::verify_timestamped_payload;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookError {
    #[error("Webhook secret not configured")]
    NotConfigured,

    #[error("Missing signature header")]
    MissingSignature,

    #[error("Malformed signature header")]
    InvalidSignatureHeader,

    #[error("Signature timestamp outside tolerance")]
    TimestampOutsideTolerance,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::NotConfigured => AppError::ServiceUnavailable(err.to_string()),
            WebhookError::MalformedPayload(_) => AppError::BadRequest(anyhow::anyhow!(err)),
            _ => AppError::Unauthorized(anyhow::anyhow!(err)),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> Result<SignatureHeader, WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(
                    value
                        .parse::<i64>()
                        .map_err(|_| WebhookError::InvalidSignatureHeader)?,
                )
            }
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Ok(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => Err(WebhookError::InvalidSignatureHeader),
    }
}

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Secret<String>,
    tolerance_secs: i64,
    clock: Arc<dyn Clock>,
}

impl WebhookVerifier {
    pub fn new(secret: Secret<String>, tolerance_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret,
            tolerance_secs,
            clock,
        }
    }

    /// Checks the signature header against the raw body.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return Err(WebhookError::NotConfigured);
        }
        let header = parse_signature_header(header.ok_or(WebhookError::MissingSignature)?)?;

        let now = self.clock.now().timestamp();
        if now.abs_diff(header.timestamp) > self.tolerance_secs.unsigned_abs() {
            return Err(WebhookError::TimestampOutsideTolerance);
        }

        for signature in &header.signatures {
            let valid = verify_timestamped_payload(secret, header.timestamp, payload, signature)
                .map_err(|_| WebhookError::SignatureMismatch)?;
            if valid {
                return Ok(());
            }
        }
        Err(WebhookError::SignatureMismatch)
    }

    /// Verifies then parses a delivery.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        header: Option<&str>,
    ) -> Result<BillingEvent, WebhookError> {
        self.verify(payload, header)?;
        parse_event(payload)
    }
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: Option<i64>,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineItem {
    price: Option<StripePrice>,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionObject {
    mode: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    customer_email: Option<String>,
    customer_details: Option<CustomerDetails>,
    line_items: Option<StripeList<LineItem>>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct DeletedSubscriptionObject {
    id: String,
}

fn malformed(event_type: &str, e: impl std::fmt::Display) -> WebhookError {
    tracing::warn!(event_type, error = %e, "Failed to parse webhook object");
    WebhookError::MalformedPayload(format!("{}: {}", event_type, e))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Turns a raw provider payload into a typed event.
pub fn parse_event(payload: &[u8]) -> Result<BillingEvent, WebhookError> {
    let envelope: EventEnvelope = serde_json::from_slice(payload)
        .map_err(|e| malformed("envelope", e))?;
    let event_type = envelope.event_type.as_str();
    let event_id = envelope.id.clone();

    match event_type {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = serde_json::from_value(envelope.data.object)
                .map_err(|e| malformed(event_type, e))?;

            let Some(external_subscription_id) = non_empty(session.subscription) else {
                tracing::info!(
                    event_id = %event_id,
                    mode = session.mode.as_deref().unwrap_or("unknown"),
                    "Checkout without subscription, ignoring"
                );
                return Ok(BillingEvent::Unhandled {
                    event_id,
                    event_type: event_type.to_string(),
                });
            };
            let customer_email = non_empty(session.customer_details.and_then(|d| d.email))
                .or_else(|| non_empty(session.customer_email))
                .ok_or_else(|| malformed(event_type, "missing customer email"))?;
            let external_customer_id = non_empty(session.customer)
                .ok_or_else(|| malformed(event_type, "missing customer id"))?;
            let price_id = session
                .line_items
                .and_then(|items| items.data.into_iter().find_map(|item| item.price))
                .map(|price| price.id)
                .or_else(|| session.metadata.get("price_id").cloned());

            Ok(BillingEvent::CheckoutCompleted {
                event_id,
                customer_email,
                external_customer_id,
                external_subscription_id,
                price_id: non_empty(price_id),
                period: None,
                occurred_at: envelope
                    .created
                    .and_then(|created| DateTime::from_timestamp(created, 0)),
            })
        }
        "customer.subscription.updated" => {
            let subscription: StripeSubscription = serde_json::from_value(envelope.data.object)
                .map_err(|e| malformed(event_type, e))?;
            let status = SubscriptionStatus::from_provider(&subscription.status).ok_or_else(|| {
                malformed(event_type, format!("unknown status {}", subscription.status))
            })?;
            let period: Option<BillingPeriod> = subscription.period();

            Ok(BillingEvent::SubscriptionUpdated {
                event_id,
                external_subscription_id: subscription.id,
                status,
                period,
            })
        }
        "customer.subscription.deleted" => {
            let subscription: DeletedSubscriptionObject =
                serde_json::from_value(envelope.data.object)
                    .map_err(|e| malformed(event_type, e))?;

            Ok(BillingEvent::SubscriptionDeleted {
                event_id,
                external_subscription_id: subscription.id,
            })
        }
        _ => Ok(BillingEvent::Unhandled {
            event_id,
            event_type: envelope.event_type,
        }),
    }
}
