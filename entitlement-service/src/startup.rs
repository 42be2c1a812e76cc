//! Application startup and lifecycle management.

use crate::config::{EntitlementConfig, StorageBackend, TextProviderKind};
use crate::handlers;
use crate::models::PriceCatalog;
use crate::services::providers::AnthropicTextProvider;
use crate::services::{
    init_metrics, BillingEventReconciler, BillingProvider, Clock, EntitlementStore,
    InMemoryStore, MockTextProvider, MongoStore, StripeClient, SystemClock, TextProvider,
    UsageCounter, WebhookVerifier,
};
use axum::{
    extract::Request,
    middleware,
    routing::{delete, get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: EntitlementConfig,
    pub store: Arc<dyn EntitlementStore>,
    pub usage: UsageCounter,
    pub reconciler: BillingEventReconciler,
    pub verifier: WebhookVerifier,
    pub billing: Arc<dyn BillingProvider>,
    pub text_provider: Arc<dyn TextProvider>,
    pub prices: PriceCatalog,
}

/// External collaborators. Tests swap these for in-memory doubles.
pub struct Dependencies {
    pub store: Arc<dyn EntitlementStore>,
    pub billing: Arc<dyn BillingProvider>,
    pub text_provider: Arc<dyn TextProvider>,
    pub clock: Arc<dyn Clock>,
}

impl Dependencies {
    /// Wires real backends from configuration.
    pub async fn from_config(config: &EntitlementConfig) -> Result<Self, AppError> {
        let store: Arc<dyn EntitlementStore> = match config.storage.backend {
            StorageBackend::Mongodb => {
                let store =
                    MongoStore::connect(config.storage.uri.expose_secret(), &config.storage.database)
                        .await
                        .map_err(|e| {
                            tracing::error!(error = %e, "Failed to connect to MongoDB");
                            e
                        })?;
                store.initialize_indexes().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to initialize database indexes");
                    e
                })?;
                Arc::new(store)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory store, data is lost on restart");
                Arc::new(InMemoryStore::new())
            }
        };

        if !config.stripe.is_configured() {
            tracing::warn!("STRIPE_SECRET_KEY not set, checkout and subscription lookups disabled");
        }
        let billing: Arc<dyn BillingProvider> = Arc::new(StripeClient::new(config.stripe.clone()));

        let text_provider: Arc<dyn TextProvider> = match config.anthropic.provider {
            TextProviderKind::Anthropic => {
                tracing::info!(model = %config.anthropic.model, "Anthropic text provider initialized");
                Arc::new(AnthropicTextProvider::new(config.anthropic.clone())?)
            }
            TextProviderKind::Mock => {
                tracing::info!("Using mock text provider");
                Arc::new(MockTextProvider::new())
            }
        };

        Ok(Self {
            store,
            billing,
            text_provider,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: EntitlementConfig) -> Result<Self, AppError> {
        let deps = Dependencies::from_config(&config).await?;
        Self::build_with(config, deps).await
    }

    /// Build the application around caller-supplied collaborators.
    pub async fn build_with(config: EntitlementConfig, deps: Dependencies) -> Result<Self, AppError> {
        init_metrics();

        let prices = config.prices.catalog();
        if prices.is_empty() {
            tracing::warn!("No STRIPE_PRICE_* configured, checkout is unavailable");
        }

        let state = AppState {
            usage: UsageCounter::new(deps.store.clone()),
            reconciler: BillingEventReconciler::new(
                deps.store.clone(),
                deps.billing.clone(),
                prices.clone(),
                deps.clock.clone(),
            ),
            verifier: WebhookVerifier::new(
                config.stripe.webhook_secret.clone(),
                config.stripe.webhook_tolerance_secs,
                deps.clock,
            ),
            store: deps.store,
            billing: deps.billing,
            text_provider: deps.text_provider,
            prices,
            config: config.clone(),
        };

        // Port 0 binds a random port for testing
        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Entitlement service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state);

        tracing::info!(
            service = "entitlement-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
                account_id = tracing::field::Empty,
            )
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/tiers", get(handlers::list_tiers))
        .route("/entitlements", get(handlers::get_entitlements))
        .route(
            "/clients",
            get(handlers::list_clients).post(handlers::create_client),
        )
        .route("/clients/:id", delete(handlers::delete_client))
        .route("/generations", post(handlers::create_generation))
        .route("/checkout/sessions", post(handlers::create_checkout_session))
        .route("/webhooks/stripe", post(handlers::stripe_webhook))
        .layer(CorsLayer::permissive())
        .layer(trace_layer)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
