use crate::domain::card::{CardRecord, last_four};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::LedgerStoreBox;
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Result of a settlement attempt against the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Debited { remaining: Balance },
    Rejected { reason: String },
}

/// Processor-side card ledger.
///
/// Debits re-check existence, expiry and funds under a per-card lock, so two
/// approvals racing on one card cannot both spend the same balance.
pub struct Ledger {
    store: LedgerStoreBox,
    card_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Ledger {
    pub fn new(store: LedgerStoreBox) -> Self {
        Self {
            store,
            card_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, card_number: &str) -> Result<Option<CardRecord>> {
        self.store.get(card_number).await
    }

    pub async fn balance(&self, card_number: &str) -> Result<Option<Balance>> {
        Ok(self.store.get(card_number).await?.map(|record| record.balance))
    }

    pub async fn all(&self) -> Result<BTreeMap<String, CardRecord>> {
        self.store.get_all().await
    }

    /// Inserts or replaces a ledger entry.
    pub async fn open_card(&self, card_number: &str, record: CardRecord) -> Result<()> {
        self.store.store(card_number, record).await
    }

    async fn card_lock(&self, card_number: &str) -> Arc<Mutex<()>> {
        let mut locks = self.card_locks.lock().await;
        Arc::clone(locks.entry(card_number.to_string()).or_default())
    }

    /// Debits `amount` if the card exists, `expiry` matches and funds suffice.
    pub async fn debit(&self, card_number: &str, expiry: &str, amount: Amount) -> Result<Settlement> {
        let lock = self.card_lock(card_number).await;
        let _guard = lock.lock().await;

        let Some(mut record) = self.store.get(card_number).await? else {
            return Ok(Settlement::Rejected {
                reason: "Card not found".to_string(),
            });
        };
        if record.expiry != expiry {
            return Ok(Settlement::Rejected {
                reason: "Expiry mismatch".to_string(),
            });
        }
        if record.balance.debit(amount).is_err() {
            return Ok(Settlement::Rejected {
                reason: "Insufficient funds".to_string(),
            });
        }

        let remaining = record.balance;
        self.store.store(card_number, record).await?;
        info!(card = %last_four(card_number), %amount, %remaining, "ledger debited");
        Ok(Settlement::Debited { remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use rust_decimal_macros::dec;

    const CARD: &str = "4111111111111111";

    fn ledger(balance: rust_decimal::Decimal) -> Ledger {
        let store = InMemoryLedgerStore::with_cards([(
            CARD.to_string(),
            CardRecord::new("12/25", Balance::new(balance)),
        )]);
        Ledger::new(Box::new(store))
    }

    #[tokio::test]
    async fn test_debit_success() {
        let ledger = ledger(dec!(1000.00));
        let outcome = ledger
            .debit(CARD, "12/25", Amount::new(dec!(100.00)).unwrap())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            Settlement::Debited {
                remaining: Balance::new(dec!(900.00))
            }
        );
        assert_eq!(
            ledger.balance(CARD).await.unwrap(),
            Some(Balance::new(dec!(900.00)))
        );
    }

    #[tokio::test]
    async fn test_debit_rejections_leave_balance() {
        let ledger = ledger(dec!(50.00));
        let amount = Amount::new(dec!(60.00)).unwrap();

        let missing = ledger.debit("5500000000000004", "12/25", amount).await.unwrap();
        assert_eq!(
            missing,
            Settlement::Rejected {
                reason: "Card not found".to_string()
            }
        );
        let mismatch = ledger.debit(CARD, "11/25", amount).await.unwrap();
        assert_eq!(
            mismatch,
            Settlement::Rejected {
                reason: "Expiry mismatch".to_string()
            }
        );
        let short = ledger.debit(CARD, "12/25", amount).await.unwrap();
        assert_eq!(
            short,
            Settlement::Rejected {
                reason: "Insufficient funds".to_string()
            }
        );

        assert_eq!(
            ledger.balance(CARD).await.unwrap(),
            Some(Balance::new(dec!(50.00)))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let ledger = Arc::new(ledger(dec!(100.00)));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .debit(CARD, "12/25", Amount::new(dec!(30.00)).unwrap())
                    .await
                    .unwrap()
            }));
        }

        let mut debited = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), Settlement::Debited { .. }) {
                debited += 1;
            }
        }
        assert_eq!(debited, 3);
        assert_eq!(
            ledger.balance(CARD).await.unwrap(),
            Some(Balance::new(dec!(10.00)))
        );
    }
}
