use serde::{Deserialize, Serialize};
use std::fmt;

/// Which way a message travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    MerchantToProcessor,
    ProcessorToMerchant,
}

impl Direction {
    pub const ALL: [Direction; 2] = [
        Direction::MerchantToProcessor,
        Direction::ProcessorToMerchant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::MerchantToProcessor => "merchant_to_processor",
            Direction::ProcessorToMerchant => "processor_to_merchant",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Direction::MerchantToProcessor => 0,
            Direction::ProcessorToMerchant => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ciphertext sitting in a mailbox.
///
/// Entries are flagged as delivered rather than removed, so the mailbox
/// doubles as an audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailboxEntry {
    pub id: String,
    /// Seconds since the Unix epoch.
    pub enqueued_at: f64,
    pub message: String,
    pub delivered: bool,
}

impl MailboxEntry {
    pub fn new(message: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            enqueued_at: now.timestamp_micros() as f64 / 1_000_000.0,
            message: message.into(),
            delivered: false,
        }
    }

    /// Short form of the id for log lines.
    pub fn short_id(&self) -> &str {
        self.id
            .char_indices()
            .nth(8)
            .map_or(self.id.as_str(), |(end, _)| &self.id[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_takes_first_eight_chars() {
        let mut entry = MailboxEntry::new("ciphertext");
        entry.id = "0123456789abcdef".to_string();
        assert_eq!(entry.short_id(), "01234567");

        entry.id = "aéééééééé".to_string();
        assert_eq!(entry.short_id(), "aééééééé");

        entry.id = "é".to_string();
        assert_eq!(entry.short_id(), "é");
    }
}
