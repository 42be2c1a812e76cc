use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A client business managed by an account. Counts against the tier's
/// client quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub account_id: String,
    pub name: String,
    pub url: Option<String>,
    pub industry: Option<String>,
    pub target_audience: Option<String>,
    pub brand_voice: Option<String>,
    pub created_at: DateTime<Utc>,
}
