//! Entitlement evaluation.
//!
//! Every check is a pure function of an [`EntitlementSnapshot`] and fails
//! closed: missing subscription or usage state denies the action, and the
//! denial reason tells callers whether to show a loading state or an
//! upgrade prompt.

use crate::models::{Subscription, SubscriptionStatus, Tier, TierId, UsageRecord};
use crate::services::store::EntitlementStore;
use crate::services::usage::UsageCounter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DenialReason {
    /// Subscription or usage state could not be confirmed.
    Unavailable,
    Inactive { status: SubscriptionStatus },
    ClientLimitReached { limit: u32 },
    GenerationLimitReached { limit: u32 },
}

impl DenialReason {
    /// Whether an upgrade would lift this denial.
    pub fn is_quota(&self) -> bool {
        matches!(
            self,
            DenialReason::ClientLimitReached { .. } | DenialReason::GenerationLimitReached { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::Unavailable => "unavailable",
            DenialReason::Inactive { .. } => "inactive",
            DenialReason::ClientLimitReached { .. } => "client_limit_reached",
            DenialReason::GenerationLimitReached { .. } => "generation_limit_reached",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Unavailable => write!(f, "Subscription state unavailable"),
            DenialReason::Inactive { status } => write!(f, "Subscription is {}", status),
            DenialReason::ClientLimitReached { limit } => {
                write!(f, "Client limit of {} reached, upgrade to add more", limit)
            }
            DenialReason::GenerationLimitReached { limit } => write!(
                f,
                "Generation limit of {} reached for this period, upgrade for more",
                limit
            ),
        }
    }
}

impl From<DenialReason> for AppError {
    fn from(reason: DenialReason) -> Self {
        if reason.is_quota() {
            AppError::PaymentRequired(anyhow::anyhow!(reason.to_string()))
        } else {
            AppError::Forbidden(anyhow::anyhow!(reason.to_string()))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementDecision {
    Allowed,
    Denied(DenialReason),
}

impl EntitlementDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, EntitlementDecision::Allowed)
    }

    /// `Ok` when allowed, the denial otherwise.
    pub fn into_result(self) -> Result<(), DenialReason> {
        match self {
            EntitlementDecision::Allowed => Ok(()),
            EntitlementDecision::Denied(reason) => Err(reason),
        }
    }
}

/// Read model surfaced to the UI for quota bars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub tier: Option<TierId>,
    pub tier_name: Option<String>,
    pub status: Option<SubscriptionStatus>,
    pub generations_used: u32,
    pub generations_limit: u32,
    pub clients_limit: u32,
    pub period_end: Option<DateTime<Utc>>,
}

impl UsageStats {
    pub fn is_active(&self) -> bool {
        self.status == Some(SubscriptionStatus::Active)
    }
}

/// Usage stats plus the gate booleans, as returned by `GET /entitlements`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementView {
    #[serde(flatten)]
    pub usage: UsageStats,
    pub client_count: u32,
    pub can_add_client: bool,
    pub can_generate: bool,
}

/// Subscription and usage as read at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitlementSnapshot {
    pub subscription: Option<Subscription>,
    pub usage: Option<UsageRecord>,
}

impl EntitlementSnapshot {
    pub fn new(subscription: Option<Subscription>, usage: Option<UsageRecord>) -> Self {
        Self {
            subscription,
            usage,
        }
    }

    pub async fn load(
        store: &dyn EntitlementStore,
        usage: &UsageCounter,
        account_id: &str,
    ) -> Result<Self, AppError> {
        let subscription = store.get_subscription(account_id).await?;
        let usage = match &subscription {
            Some(sub) => Some(usage.usage_for(sub).await?),
            None => None,
        };
        Ok(Self::new(subscription, usage))
    }

    fn active_tier(&self) -> Result<&'static Tier, DenialReason> {
        let subscription = self.subscription.as_ref().ok_or(DenialReason::Unavailable)?;
        if !subscription.is_active() {
            return Err(DenialReason::Inactive {
                status: subscription.status,
            });
        }
        Ok(subscription.tier.tier())
    }

    pub fn check_client(&self, current_client_count: u32) -> EntitlementDecision {
        let tier = match self.active_tier() {
            Ok(tier) => tier,
            Err(reason) => return EntitlementDecision::Denied(reason),
        };
        if current_client_count < tier.clients {
            EntitlementDecision::Allowed
        } else {
            EntitlementDecision::Denied(DenialReason::ClientLimitReached {
                limit: tier.clients,
            })
        }
    }

    pub fn check_generation(&self) -> EntitlementDecision {
        let tier = match self.active_tier() {
            Ok(tier) => tier,
            Err(reason) => return EntitlementDecision::Denied(reason),
        };
        let Some(usage) = &self.usage else {
            return EntitlementDecision::Denied(DenialReason::Unavailable);
        };
        if usage.generations_used < tier.generations {
            EntitlementDecision::Allowed
        } else {
            EntitlementDecision::Denied(DenialReason::GenerationLimitReached {
                limit: tier.generations,
            })
        }
    }

    pub fn can_add_client(&self, current_client_count: u32) -> bool {
        self.check_client(current_client_count).is_allowed()
    }

    pub fn can_generate(&self) -> bool {
        self.check_generation().is_allowed()
    }

    pub fn usage_stats(&self) -> UsageStats {
        let Some(subscription) = &self.subscription else {
            return UsageStats {
                tier: None,
                tier_name: None,
                status: None,
                generations_used: 0,
                generations_limit: 0,
                clients_limit: 0,
                period_end: None,
            };
        };
        let tier = subscription.tier.tier();
        UsageStats {
            tier: Some(tier.id),
            tier_name: Some(tier.name.to_string()),
            status: Some(subscription.status),
            generations_used: self.usage.as_ref().map_or(0, |u| u.generations_used),
            generations_limit: tier.generations,
            clients_limit: tier.clients,
            period_end: Some(subscription.period.end()),
        }
    }

    pub fn view(&self, client_count: u32) -> EntitlementView {
        EntitlementView {
            usage: self.usage_stats(),
            client_count,
            can_add_client: self.can_add_client(client_count),
            can_generate: self.can_generate(),
        }
    }
}
