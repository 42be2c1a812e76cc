//! In-process store for development and tests.

use super::EntitlementStore;
use crate::models::{Account, BillingPeriod, Client, Subscription, SubscriptionChange, UsageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    /// Registration order is preserved so email lookup is first-match.
    accounts: Vec<Account>,
    subscriptions: HashMap<String, Subscription>,
    usage: HashMap<(String, DateTime<Utc>), UsageRecord>,
    clients: Vec<Client>,
}

/// All collections live behind one lock, so every operation is atomic with
/// respect to every other.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with a database error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "in-memory store marked unavailable"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementStore for InMemoryStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.accounts.iter().find(|a| a.email == email).cloned())
    }

    async fn record_account(&self, account_id: &str, email: &str) -> Result<Account, AppError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if let Some(existing) = state.accounts.iter_mut().find(|a| a.id == account_id) {
            existing.email = email.to_string();
            return Ok(existing.clone());
        }
        let account = Account {
            id: account_id.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
        };
        state.accounts.push(account.clone());
        Ok(account)
    }

    async fn get_subscription(&self, account_id: &str) -> Result<Option<Subscription>, AppError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.subscriptions.get(account_id).cloned())
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state
            .subscriptions
            .insert(subscription.account_id.clone(), subscription.clone());
        Ok(())
    }

    async fn update_subscription_by_external_id(
        &self,
        external_subscription_id: &str,
        change: SubscriptionChange,
    ) -> Result<Option<Subscription>, AppError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let Some(subscription) = state
            .subscriptions
            .values_mut()
            .find(|s| s.external_subscription_id == external_subscription_id)
        else {
            return Ok(None);
        };
        subscription.status = change.status;
        if let Some(period) = change.period {
            subscription.period = period;
        }
        Ok(Some(subscription.clone()))
    }

    async fn get_usage(
        &self,
        account_id: &str,
        period_start: DateTime<Utc>,
    ) -> Result<Option<UsageRecord>, AppError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .usage
            .get(&(account_id.to_string(), period_start))
            .cloned())
    }

    async fn increment_usage(
        &self,
        account_id: &str,
        period: &BillingPeriod,
    ) -> Result<UsageRecord, AppError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let record = state
            .usage
            .entry((account_id.to_string(), period.start()))
            .or_insert_with(|| UsageRecord::empty(account_id, period));
        record.generations_used = record.generations_used.saturating_add(1);
        Ok(record.clone())
    }

    async fn count_clients(&self, account_id: &str) -> Result<u32, AppError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let count = state
            .clients
            .iter()
            .filter(|c| c.account_id == account_id)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn insert_client(&self, client: &Client) -> Result<(), AppError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if state.clients.iter().any(|c| c.id == client.id) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Client {} already exists",
                client.id
            )));
        }
        state.clients.push(client.clone());
        Ok(())
    }

    async fn list_clients(&self, account_id: &str) -> Result<Vec<Client>, AppError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .clients
            .iter()
            .filter(|c| c.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn delete_client(&self, account_id: &str, client_id: &str) -> Result<bool, AppError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let before = state.clients.len();
        state
            .clients
            .retain(|c| !(c.account_id == account_id && c.id == client_id));
        Ok(state.clients.len() < before)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.check_available()
    }
}
