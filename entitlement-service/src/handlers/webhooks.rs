use crate::services::webhook::SIGNATURE_HEADER;
use crate::services::WebhookOutcome;
use crate::startup::AppState;
use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde::Serialize;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

/// Billing provider webhook. The body is taken raw because the signature
/// covers the exact bytes sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let event = state.verifier.verify_and_parse(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Rejected webhook delivery");
        e
    })?;

    let outcome = state.reconciler.reconcile(event).await?;
    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
