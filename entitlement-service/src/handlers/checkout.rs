use crate::middleware::AccountContext;
use crate::models::{BillingCycle, TierId};
use crate::services::billing::CheckoutRequest;
use crate::startup::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub tier: TierId,
    pub billing_cycle: BillingCycle,
    #[validate(email(message = "Invalid email address"))]
    pub customer_email: String,
    #[validate(url(message = "Invalid success URL"))]
    pub success_url: Option<String>,
    #[validate(url(message = "Invalid cancel URL"))]
    pub cancel_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCheckoutResponse {
    pub url: String,
}

/// Starts a hosted checkout for a tier. The subscription itself is written
/// later, when the provider's webhook arrives.
#[tracing::instrument(skip(state, request), fields(account_id = %account.account_id))]
pub async fn create_checkout_session(
    State(state): State<AppState>,
    account: AccountContext,
    Json(request): Json<CreateCheckoutRequest>,
) -> Result<Json<CreateCheckoutResponse>, AppError> {
    request.validate()?;
    let email = verified_email(&account, &request.customer_email)?;

    let price_id = state
        .prices
        .price_for(request.tier, request.billing_cycle)
        .ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "No price configured for {} ({})",
                request.tier,
                request.billing_cycle.as_str()
            ))
        })?
        .to_string();

    // The webhook only carries the email, so the mapping must exist first.
    state.store.record_account(&account.account_id, &email).await?;

    let public_url = state.config.public_url.trim_end_matches('/');
    let checkout = CheckoutRequest {
        price_id,
        customer_email: email,
        account_id: account.account_id.clone(),
        success_url: request
            .success_url
            .unwrap_or_else(|| format!("{}/?subscription=success", public_url)),
        cancel_url: request
            .cancel_url
            .unwrap_or_else(|| format!("{}/pricing?canceled=true", public_url)),
    };

    let session = state.billing.create_checkout_session(&checkout).await?;
    tracing::info!(
        session_id = %session.id,
        tier = %request.tier,
        cycle = request.billing_cycle.as_str(),
        "Checkout session created"
    );

    Ok(Json(CreateCheckoutResponse { url: session.url }))
}

/// The reconciler trusts the account <-> email link, so it is only written
/// with the address the gateway resolved for the caller.
fn verified_email(account: &AccountContext, requested: &str) -> Result<String, AppError> {
    let email = account
        .email
        .as_deref()
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-Account-Email header")))?;
    if !email.eq_ignore_ascii_case(requested.trim()) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Checkout email does not match the signed-in account"
        )));
    }
    Ok(email.to_string())
}
