//! Mapping between billing-provider price ids and `(tier, cycle)` pairs.

use super::tier::{lowest_tier, BillingCycle, TierId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceEntry {
    pub price_id: String,
    pub tier: TierId,
    pub cycle: BillingCycle,
}

/// Configured price ids. Empty ids are never registered, so an unconfigured
/// price cannot accidentally match a blank field in a notification.
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    entries: Vec<PriceEntry>,
}

impl PriceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, tier: TierId, cycle: BillingCycle, price_id: impl Into<String>) -> Self {
        let price_id = price_id.into();
        if price_id.trim().is_empty() {
            return self;
        }
        self.entries.retain(|e| !(e.tier == tier && e.cycle == cycle));
        self.entries.push(PriceEntry {
            price_id,
            tier,
            cycle,
        });
        self
    }

    pub fn price_for(&self, tier: TierId, cycle: BillingCycle) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.tier == tier && e.cycle == cycle)
            .map(|e| e.price_id.as_str())
    }

    pub fn tier_for_price(&self, price_id: &str) -> Option<TierId> {
        self.entries
            .iter()
            .find(|e| e.price_id == price_id)
            .map(|e| e.tier)
    }

    /// Tier to grant for a paid price. Unknown or missing prices fall back to
    /// the lowest tier so a paying customer is never left without entitlement.
    pub fn resolve_tier(&self, price_id: Option<&str>) -> TierId {
        match price_id.and_then(|p| self.tier_for_price(p)) {
            Some(tier) => tier,
            None => {
                let fallback = lowest_tier().id;
                tracing::warn!(
                    price_id = price_id.unwrap_or("<none>"),
                    fallback_tier = %fallback,
                    "Unmapped price id, granting lowest tier"
                );
                fallback
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
