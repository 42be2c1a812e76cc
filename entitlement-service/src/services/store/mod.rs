//! Persistence for subscriptions, usage, accounts and clients.
//!
//! The store is the synchronization point for concurrent requests: every
//! mutation is a single atomic operation at this layer.

pub mod memory;
pub mod mongo;

use crate::models::{Account, BillingPeriod, Client, Subscription, SubscriptionChange, UsageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Earliest-registered account with this email. Duplicate emails across
    /// accounts are not disambiguated.
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    /// Registers `account_id ↔ email`, keeping the original `created_at` on
    /// re-registration.
    async fn record_account(&self, account_id: &str, email: &str) -> Result<Account, AppError>;

    async fn get_subscription(&self, account_id: &str) -> Result<Option<Subscription>, AppError>;

    /// Inserts or fully replaces the account's subscription.
    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), AppError>;

    /// Applies `change` to the subscription with this provider id. Returns
    /// the updated record, or `None` when no subscription matches.
    async fn update_subscription_by_external_id(
        &self,
        external_subscription_id: &str,
        change: SubscriptionChange,
    ) -> Result<Option<Subscription>, AppError>;

    async fn get_usage(
        &self,
        account_id: &str,
        period_start: DateTime<Utc>,
    ) -> Result<Option<UsageRecord>, AppError>;

    /// Atomically adds one generation to the record for `period`, creating
    /// it with a count of one when absent.
    async fn increment_usage(
        &self,
        account_id: &str,
        period: &BillingPeriod,
    ) -> Result<UsageRecord, AppError>;

    async fn count_clients(&self, account_id: &str) -> Result<u32, AppError>;

    async fn insert_client(&self, client: &Client) -> Result<(), AppError>;

    async fn list_clients(&self, account_id: &str) -> Result<Vec<Client>, AppError>;

    /// Returns whether a client was removed.
    async fn delete_client(&self, account_id: &str, client_id: &str) -> Result<bool, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
