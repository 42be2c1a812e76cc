use crate::models::{BillingCycle, PriceCatalog, TierId};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_optional_env, is_production};
use service_core::error::AppError;

const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Public origin of the web app, used for checkout return URLs.
    pub public_url: String,
    pub storage: StorageConfig,
    pub stripe: StripeConfig,
    pub prices: PriceConfig,
    pub anthropic: AnthropicConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub uri: Secret<String>,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    /// Maximum age of a webhook signature timestamp.
    pub webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn is_configured(&self) -> bool {
        !self.secret_key.expose_secret().is_empty()
    }
}

/// Provider price ids per tier and cycle. Unset entries are simply not
/// purchasable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceConfig {
    pub starter_monthly: Option<String>,
    pub starter_yearly: Option<String>,
    pub pro_monthly: Option<String>,
    pub pro_yearly: Option<String>,
    pub agency_monthly: Option<String>,
    pub agency_yearly: Option<String>,
}

impl PriceConfig {
    pub fn catalog(&self) -> PriceCatalog {
        [
            (TierId::Starter, BillingCycle::Monthly, &self.starter_monthly),
            (TierId::Starter, BillingCycle::Yearly, &self.starter_yearly),
            (TierId::Pro, BillingCycle::Monthly, &self.pro_monthly),
            (TierId::Pro, BillingCycle::Yearly, &self.pro_yearly),
            (TierId::Agency, BillingCycle::Monthly, &self.agency_monthly),
            (TierId::Agency, BillingCycle::Yearly, &self.agency_yearly),
        ]
        .into_iter()
        .fold(PriceCatalog::new(), |catalog, (tier, cycle, price)| match price {
            Some(price) => catalog.with_price(tier, cycle, price.clone()),
            None => catalog,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextProviderKind {
    Anthropic,
    Mock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicConfig {
    pub provider: TextProviderKind,
    pub api_key: Secret<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
}

impl EntitlementConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = is_production();

        let backend = match get_env("STORAGE_BACKEND", Some("mongodb"), is_prod)?.as_str() {
            "mongodb" => StorageBackend::Mongodb,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown STORAGE_BACKEND: {}",
                    other
                )))
            }
        };
        let mongo_uri = match backend {
            StorageBackend::Mongodb => get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
            StorageBackend::Memory => String::new(),
        };

        let provider = match get_env("TEXT_PROVIDER", Some("anthropic"), is_prod)?.as_str() {
            "anthropic" => TextProviderKind::Anthropic,
            "mock" => TextProviderKind::Mock,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Unknown TEXT_PROVIDER: {}",
                    other
                )))
            }
        };

        Ok(EntitlementConfig {
            common: common_config,
            service_name: get_env("SERVICE_NAME", Some("entitlement-service"), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            public_url: get_env("PUBLIC_URL", Some("http://localhost:5173"), is_prod)?,
            storage: StorageConfig {
                backend,
                uri: Secret::new(mongo_uri),
                database: get_env("MONGODB_DATABASE", Some("entitlement_db"), is_prod)?,
            },
            stripe: StripeConfig {
                secret_key: Secret::new(get_env("STRIPE_SECRET_KEY", Some(""), is_prod)?),
                webhook_secret: Secret::new(get_env("STRIPE_WEBHOOK_SECRET", Some(""), is_prod)?),
                api_base_url: get_env("STRIPE_API_BASE_URL", Some(DEFAULT_STRIPE_API_BASE), false)?,
                webhook_tolerance_secs: get_env(
                    "STRIPE_WEBHOOK_TOLERANCE_SECS",
                    Some(&DEFAULT_WEBHOOK_TOLERANCE_SECS.to_string()),
                    false,
                )?
                .parse()
                .unwrap_or(DEFAULT_WEBHOOK_TOLERANCE_SECS),
            },
            prices: PriceConfig {
                starter_monthly: get_optional_env("STRIPE_PRICE_STARTER_MONTHLY"),
                starter_yearly: get_optional_env("STRIPE_PRICE_STARTER_YEARLY"),
                pro_monthly: get_optional_env("STRIPE_PRICE_PRO_MONTHLY"),
                pro_yearly: get_optional_env("STRIPE_PRICE_PRO_YEARLY"),
                agency_monthly: get_optional_env("STRIPE_PRICE_AGENCY_MONTHLY"),
                agency_yearly: get_optional_env("STRIPE_PRICE_AGENCY_YEARLY"),
            },
            anthropic: AnthropicConfig {
                provider,
                api_key: Secret::new(match provider {
                    TextProviderKind::Anthropic => get_env("ANTHROPIC_API_KEY", Some(""), is_prod)?,
                    TextProviderKind::Mock => String::new(),
                }),
                model: get_env("ANTHROPIC_MODEL", Some("claude-sonnet-4-20250514"), false)?,
                base_url: get_env("ANTHROPIC_API_BASE_URL", Some(DEFAULT_ANTHROPIC_API_BASE), false)?,
                max_tokens: get_env("ANTHROPIC_MAX_TOKENS", Some("1024"), false)?
                    .parse()
                    .unwrap_or(1024),
            },
        })
    }
}
