pub mod billing;
pub mod clock;
pub mod entitlement;
pub mod metrics;
pub mod providers;
pub mod reconciler;
pub mod store;
pub mod usage;
pub mod webhook;

pub use billing::{BillingProvider, MockBillingProvider, StripeClient};
pub use clock::{Clock, FixedClock, SystemClock};
pub use entitlement::{
    DenialReason, EntitlementDecision, EntitlementSnapshot, EntitlementView, UsageStats,
};
pub use metrics::{get_metrics, init_metrics};
pub use providers::{MockTextProvider, TextProvider};
pub use reconciler::{BillingEventReconciler, WebhookOutcome};
pub use store::{EntitlementStore, InMemoryStore, MongoStore};
pub use usage::UsageCounter;
pub use webhook::WebhookVerifier;
