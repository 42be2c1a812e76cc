use super::subscription::BillingPeriod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generations consumed by one account within one billing period.
///
/// Keyed by `(account_id, period_start)`; records from past periods are kept
/// and never touched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub account_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub generations_used: u32,
}

impl UsageRecord {
    /// Zero-valued record for a period that has no stored usage yet.
    pub fn empty(account_id: &str, period: &BillingPeriod) -> Self {
        Self {
            account_id: account_id.to_string(),
            period_start: period.start(),
            period_end: period.end(),
            generations_used: 0,
        }
    }
}
