//! MongoDB-backed store.
//!
//! Usage increments are a single `$inc` upsert against a unique
//! `(account_id, period_start)` index, so concurrent generations never lose
//! an update.

use super::EntitlementStore;
use crate::models::{
    Account, BillingPeriod, Client, Subscription, SubscriptionChange, SubscriptionStatus, TierId,
    UsageRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime},
    error::{ErrorKind, WriteFailure},
    options::{
        FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReplaceOptions,
        ReturnDocument,
    },
    Client as MongoClient, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Serialize, Deserialize)]
struct AccountDocument {
    #[serde(rename = "_id")]
    id: String,
    email: String,
    created_at: BsonDateTime,
}

impl From<AccountDocument> for Account {
    fn from(doc: AccountDocument) -> Self {
        Account {
            id: doc.id,
            email: doc.email,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SubscriptionDocument {
    #[serde(rename = "_id")]
    account_id: String,
    tier: TierId,
    status: SubscriptionStatus,
    external_customer_id: String,
    external_subscription_id: String,
    period_start: BsonDateTime,
    period_end: BsonDateTime,
    updated_at: BsonDateTime,
}

impl From<&Subscription> for SubscriptionDocument {
    fn from(sub: &Subscription) -> Self {
        SubscriptionDocument {
            account_id: sub.account_id.clone(),
            tier: sub.tier,
            status: sub.status,
            external_customer_id: sub.external_customer_id.clone(),
            external_subscription_id: sub.external_subscription_id.clone(),
            period_start: BsonDateTime::from_chrono(sub.period.start()),
            period_end: BsonDateTime::from_chrono(sub.period.end()),
            updated_at: BsonDateTime::now(),
        }
    }
}

impl TryFrom<SubscriptionDocument> for Subscription {
    type Error = AppError;

    fn try_from(doc: SubscriptionDocument) -> Result<Self, Self::Error> {
        let period = BillingPeriod::new(doc.period_start.to_chrono(), doc.period_end.to_chrono())
            .map_err(|e| {
                tracing::error!(account_id = %doc.account_id, error = %e, "Stored subscription has an invalid period");
                AppError::DatabaseError(anyhow::anyhow!(e))
            })?;
        Ok(Subscription {
            account_id: doc.account_id,
            tier: doc.tier,
            status: doc.status,
            external_customer_id: doc.external_customer_id,
            external_subscription_id: doc.external_subscription_id,
            period,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UsageDocument {
    account_id: String,
    period_start: BsonDateTime,
    period_end: BsonDateTime,
    generations_used: i64,
}

impl From<UsageDocument> for UsageRecord {
    fn from(doc: UsageDocument) -> Self {
        UsageRecord {
            account_id: doc.account_id,
            period_start: doc.period_start.to_chrono(),
            period_end: doc.period_end.to_chrono(),
            generations_used: u32::try_from(doc.generations_used.max(0)).unwrap_or(u32::MAX),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ClientDocument {
    #[serde(rename = "_id")]
    id: String,
    account_id: String,
    name: String,
    url: Option<String>,
    industry: Option<String>,
    target_audience: Option<String>,
    brand_voice: Option<String>,
    created_at: BsonDateTime,
}

impl From<&Client> for ClientDocument {
    fn from(client: &Client) -> Self {
        ClientDocument {
            id: client.id.clone(),
            account_id: client.account_id.clone(),
            name: client.name.clone(),
            url: client.url.clone(),
            industry: client.industry.clone(),
            target_audience: client.target_audience.clone(),
            brand_voice: client.brand_voice.clone(),
            created_at: BsonDateTime::from_chrono(client.created_at),
        }
    }
}

impl From<ClientDocument> for Client {
    fn from(doc: ClientDocument) -> Self {
        Client {
            id: doc.id,
            account_id: doc.account_id,
            name: doc.name,
            url: doc.url,
            industry: doc.industry,
            target_audience: doc.target_audience,
            brand_voice: doc.brand_voice,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

fn db_error(context: &str, e: mongodb::error::Error) -> AppError {
    tracing::error!("{}: {}", context, e);
    AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    match e.kind.as_ref() {
        ErrorKind::Command(err) => err.code == DUPLICATE_KEY,
        ErrorKind::Write(WriteFailure::WriteError(err)) => err.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri)
            .await
            .map_err(|e| db_error("Failed to connect to MongoDB", e))?;
        Ok(Self::new(client.database(database)))
    }

    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn accounts(&self) -> Collection<AccountDocument> {
        self.db.collection("accounts")
    }

    fn subscriptions(&self) -> Collection<SubscriptionDocument> {
        self.db.collection("subscriptions")
    }

    fn usage(&self) -> Collection<UsageDocument> {
        self.db.collection("usage")
    }

    fn clients(&self) -> Collection<ClientDocument> {
        self.db.collection("clients")
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for entitlement-service");

        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1, "created_at": 1 })
            .options(IndexOptions::builder().name("email_idx".to_string()).build())
            .build();
        self.accounts()
            .create_index(email_index, None)
            .await
            .map_err(|e| db_error("Failed to create account indexes", e))?;

        let external_id_index = IndexModel::builder()
            .keys(doc! { "external_subscription_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("external_subscription_idx".to_string())
                    .build(),
            )
            .build();
        self.subscriptions()
            .create_index(external_id_index, None)
            .await
            .map_err(|e| db_error("Failed to create subscription indexes", e))?;

        let period_index = IndexModel::builder()
            .keys(doc! { "account_id": 1, "period_start": 1 })
            .options(
                IndexOptions::builder()
                    .name("account_period_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.usage()
            .create_index(period_index, None)
            .await
            .map_err(|e| db_error("Failed to create usage indexes", e))?;

        let client_index = IndexModel::builder()
            .keys(doc! { "account_id": 1, "created_at": 1 })
            .options(IndexOptions::builder().name("account_client_idx".to_string()).build())
            .build();
        self.clients()
            .create_index(client_index, None)
            .await
            .map_err(|e| db_error("Failed to create client indexes", e))?;

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    async fn try_increment(
        &self,
        account_id: &str,
        period: &BillingPeriod,
    ) -> Result<Option<UsageDocument>, mongodb::error::Error> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        self.usage()
            .find_one_and_update(
                doc! {
                    "account_id": account_id,
                    "period_start": BsonDateTime::from_chrono(period.start()),
                },
                doc! {
                    "$inc": { "generations_used": 1_i64 },
                    "$setOnInsert": { "period_end": BsonDateTime::from_chrono(period.end()) },
                },
                options,
            )
            .await
    }
}

#[async_trait]
impl EntitlementStore for MongoStore {
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": 1, "_id": 1 })
            .build();
        let account = self
            .accounts()
            .find_one(doc! { "email": email }, options)
            .await
            .map_err(|e| db_error("Failed to look up account by email", e))?;
        Ok(account.map(Account::from))
    }

    async fn record_account(&self, account_id: &str, email: &str) -> Result<Account, AppError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let account = self
            .accounts()
            .find_one_and_update(
                doc! { "_id": account_id },
                doc! {
                    "$set": { "email": email },
                    "$setOnInsert": { "created_at": BsonDateTime::now() },
                },
                options,
            )
            .await
            .map_err(|e| db_error("Failed to record account", e))?
            .ok_or_else(|| {
                AppError::DatabaseError(anyhow::anyhow!("Account upsert returned no document"))
            })?;
        Ok(account.into())
    }

    async fn get_subscription(&self, account_id: &str) -> Result<Option<Subscription>, AppError> {
        self.subscriptions()
            .find_one(doc! { "_id": account_id }, None)
            .await
            .map_err(|e| db_error("Failed to get subscription", e))?
            .map(Subscription::try_from)
            .transpose()
    }

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<(), AppError> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.subscriptions()
            .replace_one(
                doc! { "_id": subscription.account_id.as_str() },
                SubscriptionDocument::from(subscription),
                options,
            )
            .await
            .map_err(|e| db_error("Failed to upsert subscription", e))?;
        Ok(())
    }

    async fn update_subscription_by_external_id(
        &self,
        external_subscription_id: &str,
        change: SubscriptionChange,
    ) -> Result<Option<Subscription>, AppError> {
        let status = mongodb::bson::to_bson(&change.status).map_err(|e| {
            tracing::error!("Failed to serialize status: {}", e);
            AppError::DatabaseError(anyhow::anyhow!(e.to_string()))
        })?;
        let mut set = doc! {
            "status": status,
            "updated_at": BsonDateTime::now(),
        };
        if let Some(period) = change.period {
            set.insert("period_start", BsonDateTime::from_chrono(period.start()));
            set.insert("period_end", BsonDateTime::from_chrono(period.end()));
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        self.subscriptions()
            .find_one_and_update(
                doc! { "external_subscription_id": external_subscription_id },
                doc! { "$set": set },
                options,
            )
            .await
            .map_err(|e| db_error("Failed to update subscription", e))?
            .map(Subscription::try_from)
            .transpose()
    }

    async fn get_usage(
        &self,
        account_id: &str,
        period_start: DateTime<Utc>,
    ) -> Result<Option<UsageRecord>, AppError> {
        let usage = self
            .usage()
            .find_one(
                doc! {
                    "account_id": account_id,
                    "period_start": BsonDateTime::from_chrono(period_start),
                },
                None,
            )
            .await
            .map_err(|e| db_error("Failed to get usage", e))?;
        Ok(usage.map(UsageRecord::from))
    }

    async fn increment_usage(
        &self,
        account_id: &str,
        period: &BillingPeriod,
    ) -> Result<UsageRecord, AppError> {
        // Two first-of-period upserts can race on the unique index; the loser
        // retries as a plain increment.
        let result = match self.try_increment(account_id, period).await {
            Err(e) if is_duplicate_key(&e) => self.try_increment(account_id, period).await,
            other => other,
        };

        result
            .map_err(|e| db_error("Failed to increment usage", e))?
            .map(UsageRecord::from)
            .ok_or_else(|| {
                AppError::DatabaseError(anyhow::anyhow!("Usage upsert returned no document"))
            })
    }

    async fn count_clients(&self, account_id: &str) -> Result<u32, AppError> {
        let count = self
            .clients()
            .count_documents(doc! { "account_id": account_id }, None)
            .await
            .map_err(|e| db_error("Failed to count clients", e))?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn insert_client(&self, client: &Client) -> Result<(), AppError> {
        self.clients()
            .insert_one(ClientDocument::from(client), None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    AppError::Conflict(anyhow::anyhow!("Client {} already exists", client.id))
                } else {
                    db_error("Failed to insert client", e)
                }
            })?;
        Ok(())
    }

    async fn list_clients(&self, account_id: &str) -> Result<Vec<Client>, AppError> {
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
        let cursor = self
            .clients()
            .find(doc! { "account_id": account_id }, options)
            .await
            .map_err(|e| db_error("Failed to list clients", e))?;
        let clients: Vec<ClientDocument> = cursor
            .try_collect()
            .await
            .map_err(|e| db_error("Failed to read clients", e))?;
        Ok(clients.into_iter().map(Client::from).collect())
    }

    async fn delete_client(&self, account_id: &str, client_id: &str) -> Result<bool, AppError> {
        let result = self
            .clients()
            .delete_one(doc! { "_id": client_id, "account_id": account_id }, None)
            .await
            .map_err(|e| db_error("Failed to delete client", e))?;
        Ok(result.deleted_count > 0)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.db
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| db_error("MongoDB health check failed", e))?;
        Ok(())
    }
}
