//! Typed billing notifications, validated before reconciliation.

use super::subscription::{BillingPeriod, SubscriptionStatus};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    CheckoutCompleted {
        event_id: String,
        customer_email: String,
        external_customer_id: String,
        external_subscription_id: String,
        /// Absent when the session payload does not expand line items.
        price_id: Option<String>,
        period: Option<BillingPeriod>,
        occurred_at: Option<DateTime<Utc>>,
    },
    SubscriptionUpdated {
        event_id: String,
        external_subscription_id: String,
        status: SubscriptionStatus,
        period: Option<BillingPeriod>,
    },
    SubscriptionDeleted {
        event_id: String,
        external_subscription_id: String,
    },
    /// Verified but irrelevant to entitlements.
    Unhandled { event_id: String, event_type: String },
}

impl BillingEvent {
    pub fn event_id(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted { event_id, .. }
            | BillingEvent::SubscriptionUpdated { event_id, .. }
            | BillingEvent::SubscriptionDeleted { event_id, .. }
            | BillingEvent::Unhandled { event_id, .. } => event_id,
        }
    }

    /// Provider event type this variant was parsed from.
    pub fn event_type(&self) -> &str {
        match self {
            BillingEvent::CheckoutCompleted { .. } => "checkout.session.completed",
            BillingEvent::SubscriptionUpdated { .. } => "customer.subscription.updated",
            BillingEvent::SubscriptionDeleted { .. } => "customer.subscription.deleted",
            BillingEvent::Unhandled { event_type, .. } => event_type,
        }
    }
}
