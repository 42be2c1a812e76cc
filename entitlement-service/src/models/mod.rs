pub mod account;
pub mod billing_event;
pub mod client;
pub mod price;
pub mod subscription;
pub mod tier;
pub mod usage;

pub use account::Account;
pub use billing_event::BillingEvent;
pub use client::Client;
pub use price::PriceCatalog;
pub use subscription::{BillingPeriod, Subscription, SubscriptionChange, SubscriptionStatus};
pub use tier::{lowest_tier, BillingCycle, Tier, TierId, TIERS};
pub use usage::UsageRecord;
