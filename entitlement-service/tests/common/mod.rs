#![allow(dead_code)]

use chrono::{DateTime, Utc};
use entitlement_service::config::{
    AnthropicConfig, EntitlementConfig, PriceConfig, StorageBackend, StorageConfig, StripeConfig,
    TextProviderKind,
};
use entitlement_service::models::{BillingPeriod, Subscription, SubscriptionStatus, TierId};
use entitlement_service::services::billing::ProviderSubscription;
use entitlement_service::services::{
    Clock, EntitlementStore, EntitlementView, FixedClock, InMemoryStore, MockBillingProvider,
    MockTextProvider,
};
use entitlement_service::startup::{Application, Dependencies};
use reqwest::Response;
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use service_core::utils::signature::sign_timestamped_payload;
use std::sync::Arc;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const PRICE_STARTER_MONTHLY: &str = "price_starter_monthly";
pub const PRICE_PRO_MONTHLY: &str = "price_pro_monthly";
pub const PRICE_AGENCY_YEARLY: &str = "price_agency_yearly";

pub fn test_config() -> EntitlementConfig {
    EntitlementConfig {
        common: CoreConfig { port: 0 },
        service_name: "entitlement-service-test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        public_url: "http://app.test".to_string(),
        storage: StorageConfig {
            backend: StorageBackend::Memory,
            uri: Secret::new(String::new()),
            database: "entitlement_test".to_string(),
        },
        stripe: StripeConfig {
            secret_key: Secret::new("sk_test_123".to_string()),
            webhook_secret: Secret::new(WEBHOOK_SECRET.to_string()),
            api_base_url: "http://stripe.invalid/v1".to_string(),
            webhook_tolerance_secs: 300,
        },
        prices: PriceConfig {
            starter_monthly: Some(PRICE_STARTER_MONTHLY.to_string()),
            pro_monthly: Some(PRICE_PRO_MONTHLY.to_string()),
            agency_yearly: Some(PRICE_AGENCY_YEARLY.to_string()),
            ..Default::default()
        },
        anthropic: AnthropicConfig {
            provider: TextProviderKind::Mock,
            api_key: Secret::new(String::new()),
            model: "test-model".to_string(),
            base_url: "http://anthropic.invalid".to_string(),
            max_tokens: 256,
        },
    }
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub store: Arc<InMemoryStore>,
    pub billing: MockBillingProvider,
    pub text_provider: MockTextProvider,
    pub clock: FixedClock,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_config(test_config()).await
    }

    pub async fn spawn_with_config(config: EntitlementConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let billing = MockBillingProvider::new();
        let text_provider = MockTextProvider::new();
        let clock = FixedClock::new(Utc::now());

        let deps = Dependencies {
            store: store.clone(),
            billing: Arc::new(billing.clone()),
            text_provider: Arc::new(text_provider.clone()),
            clock: Arc::new(clock.clone()),
        };
        let port = spawn_application(config, deps).await;

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
            store,
            billing,
            text_provider,
            clock,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn seed_subscription(
        &self,
        account_id: &str,
        tier: TierId,
        status: SubscriptionStatus,
    ) -> Subscription {
        let subscription = Subscription {
            account_id: account_id.to_string(),
            tier,
            status,
            external_customer_id: format!("cus_{}", account_id),
            external_subscription_id: format!("sub_{}", account_id),
            period: BillingPeriod::starting_at(self.clock.now()),
        };
        self.store
            .upsert_subscription(&subscription)
            .await
            .expect("Failed to seed subscription");
        subscription
    }

    pub async fn get_entitlements(&self, account_id: &str) -> EntitlementView {
        self.client
            .get(self.url("/entitlements"))
            .header("X-Account-ID", account_id)
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .expect("Failed to parse entitlements")
    }

    pub async fn generate(&self, account_id: &str, prompt: &str) -> Response {
        self.client
            .post(self.url("/generations"))
            .header("X-Account-ID", account_id)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn create_client(&self, account_id: &str, name: &str) -> Response {
        self.client
            .post(self.url("/clients"))
            .header("X-Account-ID", account_id)
            .json(&json!({ "name": name }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Starts a checkout as `account_id`, signed in through the gateway as
    /// `session_email` when given.
    pub async fn start_checkout(
        &self,
        account_id: &str,
        session_email: Option<&str>,
        body: &Value,
    ) -> Response {
        let mut request = self
            .client
            .post(self.url("/checkout/sessions"))
            .header("X-Account-ID", account_id)
            .json(body);
        if let Some(email) = session_email {
            request = request.header("X-Account-Email", email);
        }
        request.send().await.expect("Failed to execute request")
    }

    /// Makes the mock provider answer lookups for `subscription_id`.
    pub fn register_provider_subscription(&self, subscription_id: &str, price_id: &str) -> BillingPeriod {
        let period = BillingPeriod::starting_at(self.clock.now());
        self.billing.add_subscription(ProviderSubscription {
            id: subscription_id.to_string(),
            status: Some(SubscriptionStatus::Active),
            price_id: Some(price_id.to_string()),
            period: Some(period),
        });
        period
    }

    /// Posts a correctly signed webhook delivery.
    pub async fn post_webhook(&self, event: &Value) -> Response {
        let body = serde_json::to_vec(event).expect("Failed to serialize event");
        let header = sign_header(&body, self.clock.now().timestamp());
        self.post_raw_webhook(body, Some(header)).await
    }

    pub async fn post_raw_webhook(&self, body: Vec<u8>, signature: Option<String>) -> Response {
        let mut request = self
            .client
            .post(self.url("/webhooks/stripe"))
            .header("content-type", "application/json")
            .body(body);
        if let Some(signature) = signature {
            request = request.header("stripe-signature", signature);
        }
        request.send().await.expect("Failed to execute request")
    }
}

/// Builds and starts the application, returning its port once `/health`
/// answers.
pub async fn spawn_application(config: EntitlementConfig, deps: Dependencies) -> u16 {
    let app = Application::build_with(config, deps)
        .await
        .expect("Failed to build test application");
    let port = app.http_port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let address = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client
            .get(format!("{}/health", address))
            .send()
            .await
            .is_ok()
        {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    port
}

pub fn sign_header(body: &[u8], timestamp: i64) -> String {
    let signature =
        sign_timestamped_payload(WEBHOOK_SECRET, timestamp, body).expect("Failed to sign payload");
    format!("t={},v1={}", timestamp, signature)
}

pub fn checkout_completed_event(
    event_id: &str,
    email: &str,
    subscription_id: &str,
    price_id: &str,
    created: DateTime<Utc>,
) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": created.timestamp(),
        "data": {
            "object": {
                "id": format!("cs_{}", event_id),
                "object": "checkout.session",
                "mode": "subscription",
                "customer": "cus_test",
                "subscription": subscription_id,
                "customer_details": { "email": email },
                "line_items": { "data": [ { "price": { "id": price_id } } ] }
            }
        }
    })
}

pub fn subscription_updated_event(
    event_id: &str,
    subscription_id: &str,
    status: &str,
    period_start: i64,
    period_end: i64,
) -> Value {
    json!({
        "id": event_id,
        "type": "customer.subscription.updated",
        "data": {
            "object": {
                "id": subscription_id,
                "object": "subscription",
                "status": status,
                "current_period_start": period_start,
                "current_period_end": period_end,
                "items": { "data": [] }
            }
        }
    })
}

pub fn subscription_deleted_event(event_id: &str, subscription_id: &str) -> Value {
    json!({
        "id": event_id,
        "type": "customer.subscription.deleted",
        "data": { "object": { "id": subscription_id, "object": "subscription", "status": "canceled" } }
    })
}
