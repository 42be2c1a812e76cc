//! Subscription tier catalog.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of subscription tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierId {
    Starter,
    Pro,
    Agency,
}

impl TierId {
    pub const ALL: [TierId; 3] = [TierId::Starter, TierId::Pro, TierId::Agency];

    pub fn as_str(&self) -> &'static str {
        match self {
            TierId::Starter => "starter",
            TierId::Pro => "pro",
            TierId::Agency => "agency",
        }
    }

    /// Catalog entry for this tier.
    pub fn tier(&self) -> &'static Tier {
        match self {
            TierId::Starter => &TIERS[0],
            TierId::Pro => &TIERS[1],
            TierId::Agency => &TIERS[2],
        }
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starter" => Ok(TierId::Starter),
            "pro" => Ok(TierId::Pro),
            "agency" => Ok(TierId::Agency),
            other => Err(anyhow::anyhow!("Unknown tier: {}", other)),
        }
    }
}

/// Billing cadence a price is charged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }
}

/// A subscription plan with fixed quotas. Prices are whole currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tier {
    pub id: TierId,
    pub name: &'static str,
    pub clients: u32,
    pub generations: u32,
    pub monthly_price: u32,
    pub yearly_price: u32,
}

impl Tier {
    pub fn price(&self, cycle: BillingCycle) -> u32 {
        match cycle {
            BillingCycle::Monthly => self.monthly_price,
            BillingCycle::Yearly => self.yearly_price,
        }
    }
}

pub static TIERS: [Tier; 3] = [
    Tier {
        id: TierId::Starter,
        name: "Starter",
        clients: 1,
        generations: 30,
        monthly_price: 15,
        yearly_price: 144,
    },
    Tier {
        id: TierId::Pro,
        name: "Pro",
        clients: 5,
        generations: 100,
        monthly_price: 29,
        yearly_price: 279,
    },
    Tier {
        id: TierId::Agency,
        name: "Agency",
        clients: 15,
        generations: 300,
        monthly_price: 59,
        yearly_price: 569,
    },
];

/// The tier with the smallest generation quota; the fallback for unmapped prices.
pub fn lowest_tier() -> &'static Tier {
    TIERS
        .iter()
        .min_by_key(|t| t.generations)
        .unwrap_or(&TIERS[0])
}
