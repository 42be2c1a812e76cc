//! Billing provider abstraction.
//!
//! The service only needs two calls from the provider: start a hosted
//! checkout, and look up a subscription whose notification omitted price or
//! period details.

pub mod mock;
pub mod stripe;

use crate::models::{BillingPeriod, SubscriptionStatus};
use async_trait::async_trait;
use service_core::error::AppError;
use thiserror::Error;

pub use mock::MockBillingProvider;
pub use stripe::StripeClient;

#[derive(Error, Debug)]
pub enum BillingProviderError {
    #[error("Billing provider not configured")]
    NotConfigured,

    #[error("Billing provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<BillingProviderError> for AppError {
    fn from(err: BillingProviderError) -> Self {
        match err {
            BillingProviderError::NotConfigured => {
                AppError::ServiceUnavailable("Billing provider not configured".to_string())
            }
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub customer_email: String,
    pub account_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// The parts of a provider subscription the reconciler cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: Option<SubscriptionStatus>,
    pub price_id: Option<String>,
    pub period: Option<BillingPeriod>,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, BillingProviderError>;

    async fn fetch_subscription(
        &self,
        external_subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingProviderError>;
}
