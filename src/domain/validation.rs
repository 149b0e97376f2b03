//! Syntactic card checks shared by both roles.
//!
//! Nothing here touches state: the checks only look at the shape of the
//! strings a cardholder typed. Existence, expiry matching and funds are the
//! ledger's business.

use super::card::{CardData, normalize_card_number};

/// Mod-10 checksum over the digits of `number`, ignoring spaces and dashes.
pub fn luhn_valid(number: &str) -> bool {
    let digits = normalize_card_number(number);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let checksum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, digit)| {
            if i % 2 == 0 {
                digit
            } else {
                let doubled = digit * 2;
                doubled / 10 + doubled % 10
            }
        })
        .sum();

    checksum % 10 == 0
}

/// Verification code shape: three or four ASCII digits.
pub fn cvv_valid(cvv: &str) -> bool {
    matches!(cvv.len(), 3 | 4) && cvv.chars().all(|c| c.is_ascii_digit())
}

/// Stateless validator parameterised by the oldest accepted expiry year.
#[derive(Debug, Clone, Copy)]
pub struct CardValidator {
    min_expiry_year: u32,
}

impl Default for CardValidator {
    fn default() -> Self {
        Self::new(23)
    }
}

impl CardValidator {
    /// `min_expiry_year` is the two-digit year floor (e.g. `23` for 2023).
    pub fn new(min_expiry_year: u32) -> Self {
        Self { min_expiry_year }
    }

    pub fn card_number_valid(&self, number: &str) -> bool {
        luhn_valid(number)
    }

    /// Accepts `MM/YY` with month in 1..=12 and year not before the floor.
    pub fn expiry_valid(&self, expiry: &str) -> bool {
        let Some((month, year)) = expiry.split_once('/') else {
            return false;
        };
        match (month.trim().parse::<u32>(), year.trim().parse::<u32>()) {
            (Ok(month), Ok(year)) => (1..=12).contains(&month) && year >= self.min_expiry_year,
            _ => false,
        }
    }

    pub fn cvv_valid(&self, cvv: &str) -> bool {
        cvv_valid(cvv)
    }

    /// Number and expiry checks only; the code is left to the caller.
    pub fn validate_account(&self, card: &CardData, check_number: bool) -> Result<(), String> {
        if check_number && !self.card_number_valid(&card.number) {
            return Err("Invalid card format".to_string());
        }
        if !self.expiry_valid(&card.expiry) {
            return Err("Card expired or invalid expiry date".to_string());
        }
        Ok(())
    }

    /// Runs every check and reports the first failure.
    pub fn validate(&self, card: &CardData, check_number: bool) -> Result<(), String> {
        self.validate_account(card, check_number)?;
        if !self.cvv_valid(&card.cvv) {
            return Err("Invalid CVV".to_string());
        }
        Ok(())
    }
}
