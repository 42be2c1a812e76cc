//! Per-account, per-period generation counter.

use crate::models::{Subscription, UsageRecord};
use crate::services::store::EntitlementStore;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct UsageCounter {
    store: Arc<dyn EntitlementStore>,
}

impl UsageCounter {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// Usage for the subscription's current period, zero when nothing has
    /// been recorded yet. `None` when the account has no subscription.
    pub async fn current_usage(&self, account_id: &str) -> Result<Option<UsageRecord>, AppError> {
        match self.store.get_subscription(account_id).await? {
            Some(subscription) => Ok(Some(self.usage_for(&subscription).await?)),
            None => Ok(None),
        }
    }

    pub async fn usage_for(&self, subscription: &Subscription) -> Result<UsageRecord, AppError> {
        let period = &subscription.period;
        Ok(self
            .store
            .get_usage(&subscription.account_id, period.start())
            .await?
            .unwrap_or_else(|| UsageRecord::empty(&subscription.account_id, period)))
    }

    /// Adds one generation to the current period. Only called after the
    /// generation itself succeeded.
    pub async fn increment(&self, account_id: &str) -> Result<UsageRecord, AppError> {
        let subscription = self.store.get_subscription(account_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("No subscription for account {}", account_id))
        })?;

        let record = self
            .store
            .increment_usage(account_id, &subscription.period)
            .await?;

        tracing::debug!(
            account_id = %account_id,
            period_start = %record.period_start,
            generations_used = record.generations_used,
            "Usage incremented"
        );
        Ok(record)
    }
}
