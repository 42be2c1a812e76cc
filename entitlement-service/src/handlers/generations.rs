use crate::middleware::AccountContext;
use crate::services::metrics::{record_denial, record_generation};
use crate::services::providers::GenerationParams;
use crate::services::{EntitlementSnapshot, UsageStats};
use crate::startup::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateRequest {
    #[validate(length(min = 1, max = 20000, message = "Prompt must be 1-20000 characters"))]
    pub prompt: String,
    pub system: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub content: String,
    pub usage: UsageStats,
}

/// Gated generation. The counter moves only after the provider succeeds.
#[tracing::instrument(skip(state, request), fields(account_id = %account.account_id))]
pub async fn create_generation(
    State(state): State<AppState>,
    account: AccountContext,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    request.validate()?;

    let mut snapshot =
        EntitlementSnapshot::load(state.store.as_ref(), &state.usage, &account.account_id).await?;
    if let Err(reason) = snapshot.check_generation().into_result() {
        tracing::info!(reason = reason.as_str(), "Generation denied");
        record_denial("generate", reason.as_str());
        return Err(reason.into());
    }
    let tier = snapshot
        .subscription
        .as_ref()
        .map(|s| s.tier.as_str())
        .unwrap_or("none");

    let params = GenerationParams {
        max_tokens: state.config.anthropic.max_tokens,
        system: request.system,
    };
    let generation = match state.text_provider.generate(&request.prompt, &params).await {
        Ok(generation) => generation,
        Err(e) => {
            tracing::error!(error = %e, "Text generation failed");
            record_generation(tier, "failed");
            return Err(e.into());
        }
    };

    match state.usage.increment(&account.account_id).await {
        Ok(record) => snapshot.usage = Some(record),
        // The content is already produced; losing one count is preferable to
        // withholding a result the provider has billed for.
        Err(e) => tracing::error!(error = %e, "Failed to record generation usage"),
    }
    record_generation(tier, "success");

    tracing::info!(
        input_tokens = generation.input_tokens,
        output_tokens = generation.output_tokens,
        "Generation completed"
    );

    Ok(Json(GenerateResponse {
        content: generation.text,
        usage: snapshot.usage_stats(),
    }))
}
