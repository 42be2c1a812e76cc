pub mod checkout;
pub mod clients;
pub mod entitlements;
pub mod generations;
pub mod health;
pub mod webhooks;

pub use checkout::create_checkout_session;
pub use clients::{create_client, delete_client, list_clients};
pub use entitlements::{get_entitlements, list_tiers};
pub use generations::create_generation;
pub use health::{health_check, metrics_handler, readiness_check};
pub use webhooks::stripe_webhook;
