use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An account known to the billing side, registered when checkout starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}
