use crate::middleware::AccountContext;
use crate::models::Client;
use crate::services::metrics::record_denial;
use crate::services::EntitlementSnapshot;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,
    #[validate(url(message = "Invalid URL"))]
    pub url: Option<String>,
    pub industry: Option<String>,
    pub target_audience: Option<String>,
    pub brand_voice: Option<String>,
}

pub async fn list_clients(
    State(state): State<AppState>,
    account: AccountContext,
) -> Result<Json<Vec<Client>>, AppError> {
    let clients = state.store.list_clients(&account.account_id).await?;
    Ok(Json(clients))
}

/// Creates a client if the account's tier has room for one more.
#[tracing::instrument(skip(state, request), fields(account_id = %account.account_id))]
pub async fn create_client(
    State(state): State<AppState>,
    account: AccountContext,
    Json(request): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    request.validate()?;

    let snapshot =
        EntitlementSnapshot::load(state.store.as_ref(), &state.usage, &account.account_id).await?;
    let count = state.store.count_clients(&account.account_id).await?;

    if let Err(reason) = snapshot.check_client(count).into_result() {
        tracing::info!(reason = reason.as_str(), client_count = count, "Client creation denied");
        record_denial("add_client", reason.as_str());
        return Err(reason.into());
    }

    let client = Client {
        id: Uuid::new_v4().to_string(),
        account_id: account.account_id.clone(),
        name: request.name.trim().to_string(),
        url: request.url,
        industry: request.industry,
        target_audience: request.target_audience,
        brand_voice: request.brand_voice,
        created_at: Utc::now(),
    };
    state.store.insert_client(&client).await?;

    tracing::info!(client_id = %client.id, "Client created");
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn delete_client(
    State(state): State<AppState>,
    account: AccountContext,
    Path(client_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.store.delete_client(&account.account_id, &client_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(anyhow::anyhow!("Client {} not found", client_id)))
    }
}
