use crate::middleware::ACCOUNT_ID_HEADER;
use crate::services::{EntitlementSnapshot, EntitlementStore, EntitlementView, UsageCounter};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Where the poller reads entitlements from.
#[async_trait]
pub trait EntitlementSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<EntitlementView>;
}

/// Reads `GET /entitlements` from a running service, as the web client does.
pub struct HttpEntitlementSource {
    client: Client,
    base_url: String,
    account_id: String,
}

impl HttpEntitlementSource {
    pub fn new(base_url: impl Into<String>, account_id: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            account_id: account_id.into(),
        })
    }
}

#[async_trait]
impl EntitlementSource for HttpEntitlementSource {
    async fn fetch(&self) -> anyhow::Result<EntitlementView> {
        let view = self
            .client
            .get(format!("{}/entitlements", self.base_url.trim_end_matches('/')))
            .header(ACCOUNT_ID_HEADER, &self.account_id)
            .send()
            .await?
            .error_for_status()?
            .json::<EntitlementView>()
            .await?;
        Ok(view)
    }
}

/// Reads entitlements straight from the store, for in-process callers.
pub struct StoreEntitlementSource {
    store: Arc<dyn EntitlementStore>,
    usage: UsageCounter,
    account_id: String,
}

impl StoreEntitlementSource {
    pub fn new(store: Arc<dyn EntitlementStore>, account_id: impl Into<String>) -> Self {
        Self {
            usage: UsageCounter::new(store.clone()),
            store,
            account_id: account_id.into(),
        }
    }
}

#[async_trait]
impl EntitlementSource for StoreEntitlementSource {
    async fn fetch(&self) -> anyhow::Result<EntitlementView> {
        let snapshot =
            EntitlementSnapshot::load(self.store.as_ref(), &self.usage, &self.account_id).await?;
        let clients = self.store.count_clients(&self.account_id).await?;
        Ok(snapshot.view(clients))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillingPeriod, Subscription, SubscriptionStatus, TierId};
    use crate::services::InMemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn store_source_reflects_current_subscription() {
        let store = Arc::new(InMemoryStore::new());
        let source = StoreEntitlementSource::new(store.clone(), "acct");

        let view = source.fetch().await.unwrap();
        assert!(view.usage.status.is_none());
        assert!(!view.can_generate);

        store
            .upsert_subscription(&Subscription {
                account_id: "acct".to_string(),
                tier: TierId::Agency,
                status: SubscriptionStatus::Active,
                external_customer_id: "cus_1".to_string(),
                external_subscription_id: "sub_1".to_string(),
                period: BillingPeriod::starting_at(Utc::now()),
            })
            .await
            .unwrap();

        let view = source.fetch().await.unwrap();
        assert!(view.usage.is_active());
        assert_eq!(view.usage.clients_limit, 15);
        assert!(view.can_add_client);
    }

    #[tokio::test]
    async fn store_source_surfaces_storage_errors() {
        let store = Arc::new(InMemoryStore::new());
        store.set_unavailable(true);
        let source = StoreEntitlementSource::new(store, "acct");
        assert!(source.fetch().await.is_err());
    }
}
