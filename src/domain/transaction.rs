use super::card::CardFingerprint;
use super::money::Amount;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Declined,
    Fraud,
    Error,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Approved => "APPROVED",
            TransactionStatus::Declined => "DECLINED",
            TransactionStatus::Fraud => "FRAUD",
            TransactionStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment as seen by the processor.
///
/// Created `Pending` when a request is received and classified exactly once.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub card: CardFingerprint,
    pub amount: Amount,
    pub status: TransactionStatus,
    pub reason: String,
}

impl Transaction {
    pub fn new(id: impl Into<String>, card: CardFingerprint, amount: Amount) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            card,
            amount,
            status: TransactionStatus::Pending,
            reason: String::new(),
        }
    }

    /// Moves the transaction into a terminal status.
    ///
    /// Fails if it already left `Pending` or if `status` is `Pending` itself.
    pub fn finalize(&mut self, status: TransactionStatus, reason: impl Into<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(PaymentError::InternalError(format!(
                "transaction {} already {}",
                self.id, self.status
            )));
        }
        if !status.is_terminal() {
            return Err(PaymentError::InternalError(format!(
                "transaction {} cannot be finalized as {}",
                self.id, status
            )));
        }
        self.status = status;
        self.reason = reason.into();
        Ok(())
    }
}
