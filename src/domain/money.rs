use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Sub, SubAssign};

/// Funds held against a card in the ledger.
///
/// Wraps `rust_decimal::Decimal` so that ledger arithmetic stays exact.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// A strictly positive payment amount.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Whether the balance covers `amount`.
    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Debits `amount`, refusing to go below zero.
    pub fn debit(&mut self, amount: Amount) -> Result<(), PaymentError> {
        if self.covers(amount) {
            *self -= amount.into();
            Ok(())
        } else {
            Err(PaymentError::ValidationError(
                "Insufficient funds".to_string(),
            ))
        }
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_balance_debit_success() {
        let mut balance = Balance::new(dec!(1000.00));
        balance.debit(Amount::new(dec!(100.00)).unwrap()).unwrap();
        assert_eq!(balance, Balance::new(dec!(900.00)));
    }

    #[test]
    fn test_balance_debit_exact_to_zero() {
        let mut balance = Balance::new(dec!(50.00));
        balance.debit(Amount::new(dec!(50.00)).unwrap()).unwrap();
        assert_eq!(balance, Balance::ZERO);
    }

    #[test]
    fn test_balance_debit_insufficient() {
        let mut balance = Balance::new(dec!(10.0));
        let result = balance.debit(Amount::new(dec!(20.0)).unwrap());
        assert!(matches!(result, Err(PaymentError::ValidationError(_))));
        assert_eq!(balance, Balance::new(dec!(10.0)));
    }

    #[test]
    fn test_amount_rejects_non_positive_on_deserialize() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"-5.00\"");
        assert!(parsed.is_err());
        let parsed: Amount = serde_json::from_str("\"12.50\"").unwrap();
        assert_eq!(parsed.value(), dec!(12.50));
    }

    #[test]
    fn test_display_two_places() {
        assert_eq!(Balance::new(dec!(900)).to_string(), "900.00");
        assert_eq!(Amount::new(dec!(1.5)).unwrap().to_string(), "1.50");
    }
}
