use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the vault keeps under a token id.
///
/// Never holds a verification code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub card_number: String,
    pub expiry: String,
    pub masked: String,
    pub created_at: DateTime<Utc>,
}

/// Card details recovered from a token.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCard {
    pub card_number: String,
    pub expiry: String,
    pub masked: String,
}

impl From<TokenRecord> for ResolvedCard {
    fn from(record: TokenRecord) -> Self {
        Self {
            card_number: record.card_number,
            expiry: record.expiry,
            masked: record.masked,
        }
    }
}
