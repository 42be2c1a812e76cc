//! Stripe REST client and wire types.
//!
//! Implements hosted checkout session creation and subscription lookup.
//! Requests are form-encoded with bearer authentication, as the Stripe API
//! expects.

use super::{
    BillingProvider, BillingProviderError, CheckoutRequest, CheckoutSession, ProviderSubscription,
};
use crate::config::StripeConfig;
use crate::models::{BillingPeriod, SubscriptionStatus};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

/// Stripe list envelope (`{"object":"list","data":[...]}`).
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub price: Option<StripePrice>,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
}

/// Stripe subscription object. Older API versions carry the period on the
/// subscription, newer ones on each item; both are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub items: Option<StripeList<StripeSubscriptionItem>>,
}

impl StripeSubscription {
    fn first_item(&self) -> Option<&StripeSubscriptionItem> {
        self.items.as_ref().and_then(|items| items.data.first())
    }

    pub fn price_id(&self) -> Option<&str> {
        self.first_item()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }

    pub fn period(&self) -> Option<BillingPeriod> {
        let top_level = match (self.current_period_start, self.current_period_end) {
            (Some(start), Some(end)) => BillingPeriod::from_unix(start, end),
            _ => None,
        };
        top_level.or_else(|| {
            let item = self.first_item()?;
            BillingPeriod::from_unix(item.current_period_start?, item.current_period_end?)
        })
    }

    pub fn into_provider_subscription(self) -> ProviderSubscription {
        ProviderSubscription {
            status: SubscriptionStatus::from_provider(&self.status),
            price_id: self.price_id().map(str::to_string),
            period: self.period(),
            id: self.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    async fn read_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        operation: &str,
    ) -> Result<T, BillingProviderError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BillingProviderError::Network(e.to_string()))?;

        tracing::debug!(status = %status, operation, "Stripe response");

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| BillingProviderError::InvalidResponse(e.to_string()));
        }

        let message = serde_json::from_str::<StripeErrorResponse>(&body)
            .ok()
            .map(|e| {
                format!(
                    "{} ({})",
                    e.error.message.unwrap_or_default(),
                    e.error.kind.unwrap_or_else(|| "unknown".to_string())
                )
            })
            .unwrap_or_else(|| format!("HTTP {}", status));

        tracing::error!(status = %status, operation, error = %message, "Stripe request failed");
        Err(BillingProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BillingProvider for StripeClient {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingProviderError> {
        if !self.is_configured() {
            return Err(BillingProviderError::NotConfigured);
        }

        let form = [
            ("mode", "subscription"),
            ("line_items[0][price]", request.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", request.success_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("customer_email", request.customer_email.as_str()),
            ("client_reference_id", request.account_id.as_str()),
            ("metadata[account_id]", request.account_id.as_str()),
        ];

        let response = self
            .client
            .post(self.url("checkout/sessions"))
            .bearer_auth(self.config.secret_key.expose_secret())
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingProviderError::Network(e.to_string()))?;

        let session: StripeCheckoutSession =
            self.read_response(response, "create_checkout_session").await?;
        let url = session.url.ok_or_else(|| {
            BillingProviderError::InvalidResponse("checkout session has no url".to_string())
        })?;

        tracing::info!(session_id = %session.id, price_id = %request.price_id, "Checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn fetch_subscription(
        &self,
        external_subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingProviderError> {
        if !self.is_configured() {
            return Err(BillingProviderError::NotConfigured);
        }

        let response = self
            .client
            .get(self.url(&format!("subscriptions/{}", external_subscription_id)))
            .bearer_auth(self.config.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| BillingProviderError::Network(e.to_string()))?;

        let subscription: StripeSubscription =
            self.read_response(response, "fetch_subscription").await?;
        Ok(subscription.into_provider_subscription())
    }
}
