//! Billing event reconciliation.
//!
//! Applies verified billing notifications to subscription records. Every
//! handler converges under redelivery. Failures propagate so the provider
//! redelivers; there is no internal retry.

use crate::models::{
    BillingEvent, BillingPeriod, PriceCatalog, Subscription, SubscriptionChange,
    SubscriptionStatus,
};
use crate::services::billing::BillingProvider;
use crate::services::clock::Clock;
use crate::services::metrics;
use crate::services::store::EntitlementStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The subscription record was written.
    Processed,
    /// Valid event that needs no state change.
    Ignored,
    /// No subscription or account matched; acknowledged without change.
    NotFound,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::NotFound => "not_found",
        }
    }
}

impl fmt::Display for WebhookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
pub struct BillingEventReconciler {
    store: Arc<dyn EntitlementStore>,
    billing: Arc<dyn BillingProvider>,
    prices: PriceCatalog,
    clock: Arc<dyn Clock>,
}

impl BillingEventReconciler {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        billing: Arc<dyn BillingProvider>,
        prices: PriceCatalog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            billing,
            prices,
            clock,
        }
    }

    pub async fn reconcile(&self, event: BillingEvent) -> Result<WebhookOutcome, AppError> {
        let event_type = event.event_type().to_string();
        let event_id = event.event_id().to_string();

        let result = match event {
            BillingEvent::CheckoutCompleted {
                customer_email,
                external_customer_id,
                external_subscription_id,
                price_id,
                period,
                occurred_at,
                ..
            } => {
                self.checkout_completed(
                    &customer_email,
                    external_customer_id,
                    external_subscription_id,
                    price_id,
                    period,
                    occurred_at,
                )
                .await
            }
            BillingEvent::SubscriptionUpdated {
                external_subscription_id,
                status,
                period,
                ..
            } => {
                self.apply_change(&external_subscription_id, SubscriptionChange { status, period })
                    .await
            }
            BillingEvent::SubscriptionDeleted {
                external_subscription_id,
                ..
            } => {
                self.apply_change(
                    &external_subscription_id,
                    SubscriptionChange {
                        status: SubscriptionStatus::Canceled,
                        period: None,
                    },
                )
                .await
            }
            BillingEvent::Unhandled { .. } => Ok(WebhookOutcome::Ignored),
        };

        match &result {
            Ok(outcome) => {
                tracing::info!(event_id = %event_id, event_type = %event_type, outcome = %outcome, "Billing event reconciled");
                metrics::record_webhook_event(&event_type, outcome.as_str());
            }
            Err(e) => {
                tracing::error!(event_id = %event_id, event_type = %event_type, error = %e, "Billing event reconciliation failed");
                metrics::record_webhook_event(&event_type, "error");
            }
        }
        result
    }

    async fn checkout_completed(
        &self,
        customer_email: &str,
        external_customer_id: String,
        external_subscription_id: String,
        mut price_id: Option<String>,
        mut period: Option<BillingPeriod>,
        occurred_at: Option<DateTime<Utc>>,
    ) -> Result<WebhookOutcome, AppError> {
        // Duplicate emails resolve to the earliest-registered account.
        let Some(account) = self.store.find_account_by_email(customer_email).await? else {
            tracing::warn!(
                external_subscription_id = %external_subscription_id,
                "No account matches checkout email, acknowledging without change"
            );
            return Ok(WebhookOutcome::NotFound);
        };

        // Later updates and deletions own the record once it exists, so a late
        // redelivery must not reactivate it.
        if let Some(existing) = self.store.get_subscription(&account.id).await? {
            if existing.external_subscription_id == external_subscription_id {
                tracing::info!(
                    account_id = %account.id,
                    external_subscription_id = %external_subscription_id,
                    status = %existing.status,
                    "Subscription already provisioned, keeping stored record"
                );
                return Ok(WebhookOutcome::Ignored);
            }
        }

        if (price_id.is_none() || period.is_none()) && self.billing.is_configured() {
            let remote = self
                .billing
                .fetch_subscription(&external_subscription_id)
                .await
                .map_err(|e| {
                    tracing::error!(
                        external_subscription_id = %external_subscription_id,
                        error = %e,
                        "Subscription lookup failed"
                    );
                    AppError::from(e)
                })?;
            price_id = price_id.or(remote.price_id);
            period = period.or(remote.period);
        }

        let tier = self.prices.resolve_tier(price_id.as_deref());
        let period = period.unwrap_or_else(|| {
            let start = occurred_at.unwrap_or_else(|| self.clock.now());
            tracing::warn!(
                account_id = %account.id,
                period_start = %start,
                "Provider omitted billing period, synthesizing default"
            );
            BillingPeriod::starting_at(start)
        });

        let subscription = Subscription {
            account_id: account.id.clone(),
            tier,
            status: SubscriptionStatus::Active,
            external_customer_id,
            external_subscription_id,
            period,
        };
        self.store.upsert_subscription(&subscription).await?;

        tracing::info!(
            account_id = %subscription.account_id,
            tier = %subscription.tier,
            period_end = %subscription.period.end(),
            "Subscription activated"
        );
        Ok(WebhookOutcome::Processed)
    }

    async fn apply_change(
        &self,
        external_subscription_id: &str,
        change: SubscriptionChange,
    ) -> Result<WebhookOutcome, AppError> {
        let status = change.status;
        match self
            .store
            .update_subscription_by_external_id(external_subscription_id, change)
            .await?
        {
            Some(subscription) => {
                tracing::info!(
                    account_id = %subscription.account_id,
                    status = %status,
                    "Subscription updated"
                );
                Ok(WebhookOutcome::Processed)
            }
            None => {
                tracing::info!(
                    external_subscription_id = %external_subscription_id,
                    "No subscription matches, treating as not yet provisioned"
                );
                Ok(WebhookOutcome::NotFound)
            }
        }
    }
}
