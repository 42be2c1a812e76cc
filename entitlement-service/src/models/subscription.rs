use super::tier::TierId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a synthesized period when the provider omits boundaries.
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

/// Internal subscription status. A missing subscription is modelled as
/// `Option::None`, not as a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Maps a billing-provider status onto the internal set. Returns `None`
    /// for statuses the provider does not document.
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "active" | "trialing" => Some(SubscriptionStatus::Active),
            "past_due" | "unpaid" | "incomplete" | "paused" => Some(SubscriptionStatus::PastDue),
            "canceled" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Billing period end ({end}) must be after start ({start})")]
pub struct InvalidPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Half-open window `[start, end)` over which usage is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPeriod")]
pub struct BillingPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawPeriod> for BillingPeriod {
    type Error = InvalidPeriod;

    fn try_from(raw: RawPeriod) -> Result<Self, Self::Error> {
        BillingPeriod::new(raw.start, raw.end)
    }
}

impl BillingPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, InvalidPeriod> {
        if end <= start {
            return Err(InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    /// Builds a period from provider unix timestamps (seconds).
    pub fn from_unix(start: i64, end: i64) -> Option<Self> {
        let start = DateTime::from_timestamp(start, 0)?;
        let end = DateTime::from_timestamp(end, 0)?;
        Self::new(start, end).ok()
    }

    /// A default-length period beginning at `start`, truncated to whole
    /// seconds so redelivered notifications synthesize the same window.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        let start = DateTime::from_timestamp(start.timestamp(), 0).unwrap_or(start);
        Self {
            start,
            end: start + Duration::days(DEFAULT_PERIOD_DAYS),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

/// Per-account subscription record, mutated only by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub account_id: String,
    pub tier: TierId,
    pub status: SubscriptionStatus,
    pub external_customer_id: String,
    pub external_subscription_id: String,
    pub period: BillingPeriod,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// Fields a subscription-updated notification may overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub status: SubscriptionStatus,
    pub period: Option<BillingPeriod>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_rejects_non_increasing_bounds() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(BillingPeriod::new(t, t).is_err());
        assert!(BillingPeriod::new(t, t - Duration::seconds(1)).is_err());
        assert!(BillingPeriod::new(t, t + Duration::seconds(1)).is_ok());
    }

    #[test]
    fn deserializing_an_inverted_period_fails() {
        let json = r#"{"start":"2024-02-01T00:00:00Z","end":"2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<BillingPeriod>(json).is_err());
    }

    #[test]
    fn synthesized_period_is_thirty_days_on_whole_seconds() {
        let t = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap() + Duration::milliseconds(750);
        let period = BillingPeriod::starting_at(t);
        assert_eq!(period.start().timestamp_subsec_nanos(), 0);
        assert_eq!(period.end() - period.start(), Duration::days(30));
        assert_eq!(period, BillingPeriod::starting_at(t + Duration::milliseconds(100)));
    }

    #[test]
    fn provider_statuses_map_onto_internal_set() {
        assert_eq!(SubscriptionStatus::from_provider("trialing"), Some(SubscriptionStatus::Active));
        assert_eq!(SubscriptionStatus::from_provider("unpaid"), Some(SubscriptionStatus::PastDue));
        assert_eq!(
            SubscriptionStatus::from_provider("incomplete_expired"),
            Some(SubscriptionStatus::Canceled)
        );
        assert_eq!(SubscriptionStatus::from_provider("bogus"), None);
    }
}
