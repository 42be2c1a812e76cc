use crate::middleware::AccountContext;
use crate::models::TIERS;
use crate::services::{EntitlementSnapshot, EntitlementView};
use crate::startup::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;

/// Current tier, usage and gate booleans for the calling account.
#[tracing::instrument(skip(state), fields(account_id = %account.account_id))]
pub async fn get_entitlements(
    State(state): State<AppState>,
    account: AccountContext,
) -> Result<Json<EntitlementView>, AppError> {
    let snapshot =
        EntitlementSnapshot::load(state.store.as_ref(), &state.usage, &account.account_id).await?;
    let clients = state.store.count_clients(&account.account_id).await?;
    Ok(Json(snapshot.view(clients)))
}

/// The static tier catalog, for the pricing page.
pub async fn list_tiers() -> impl IntoResponse {
    Json(&TIERS)
}
