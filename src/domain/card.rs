use super::money::Balance;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Card details as entered by the cardholder for a single submission.
///
/// The verification code travels inside the encrypted request only. `Debug`
/// is implemented by hand so the number and code never reach a log line.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CardData {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
}

impl CardData {
    pub fn new(
        number: impl Into<String>,
        expiry: impl Into<String>,
        cvv: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            expiry: expiry.into(),
            cvv: cvv.into(),
        }
    }

    pub fn masked(&self) -> String {
        mask_card_number(&self.number)
    }

    pub fn fingerprint(&self) -> CardFingerprint {
        CardFingerprint::of(&self.number)
    }
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("number", &self.masked())
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .finish()
    }
}

/// Strips the separators a cardholder may type between digit groups.
pub fn normalize_card_number(number: &str) -> String {
    number.chars().filter(|c| *c != ' ' && *c != '-').collect()
}

pub fn last_four(number: &str) -> String {
    let digits: Vec<char> = normalize_card_number(number).chars().collect();
    let start = digits.len().saturating_sub(4);
    digits[start..].iter().collect()
}

pub fn mask_card_number(number: &str) -> String {
    let digits = normalize_card_number(number);
    if digits.chars().count() >= 4 {
        format!("**** **** **** {}", last_four(&digits))
    } else {
        "****".to_string()
    }
}

/// Non-reversible summary of a card kept on transaction records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFingerprint {
    pub bin: String,
    pub last4: String,
}

impl CardFingerprint {
    pub fn of(number: &str) -> Self {
        let digits = normalize_card_number(number);
        let bin: String = digits.chars().take(6).collect();
        Self {
            bin,
            last4: last_four(&digits),
        }
    }
}

/// Ledger entry owned by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    pub expiry: String,
    pub balance: Balance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardholder: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
}

impl CardRecord {
    pub fn new(expiry: impl Into<String>, balance: Balance) -> Self {
        Self {
            expiry: expiry.into(),
            balance,
            cardholder: None,
            card_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mask_card_number() {
        assert_eq!(mask_card_number("4111111111111111"), "**** **** **** 1111");
        assert_eq!(mask_card_number("4111-1111-1111-1234"), "**** **** **** 1234");
        assert_eq!(mask_card_number("12"), "****");
    }

    #[test]
    fn test_fingerprint() {
        let fp = CardFingerprint::of("6060 1234 5678 9012");
        assert_eq!(fp.bin, "606012");
        assert_eq!(fp.last4, "9012");
    }

    #[test]
    fn test_debug_hides_sensitive_fields() {
        let card = CardData::new("4111111111111111", "12/25", "123");
        let rendered = format!("{:?}", card);
        assert!(!rendered.contains("4111111111111111"));
        assert!(!rendered.contains("123\""));
        assert!(rendered.contains("**** **** **** 1111"));
    }

    #[test]
    fn test_card_record_reads_display_fields() {
        let json = r#"{"expiry":"12/25","balance":1000.0,"cardholder":"John Doe","type":"Visa"}"#;
        let record: CardRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.balance, Balance::new(dec!(1000.0)));
        assert_eq!(record.cardholder.as_deref(), Some("John Doe"));
        assert_eq!(record.card_type.as_deref(), Some("Visa"));
    }
}
