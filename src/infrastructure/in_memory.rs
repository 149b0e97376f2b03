use crate::domain::card::CardRecord;
use crate::domain::mailbox::{Direction, MailboxEntry};
use crate::domain::ports::{HistoryStore, LedgerStore, MailboxStore, TokenStore};
use crate::domain::token::TokenRecord;
use crate::domain::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory card ledger.
///
/// Uses `Arc<RwLock<BTreeMap<String, CardRecord>>>` so clones share state.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    cards: Arc<RwLock<BTreeMap<String, CardRecord>>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger pre-populated with `cards`.
    pub fn with_cards(cards: impl IntoIterator<Item = (String, CardRecord)>) -> Self {
        Self {
            cards: Arc::new(RwLock::new(cards.into_iter().collect())),
        }
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn store(&self, card_number: &str, record: CardRecord) -> Result<()> {
        let mut cards = self.cards.write().await;
        cards.insert(card_number.to_string(), record);
        Ok(())
    }

    async fn get(&self, card_number: &str) -> Result<Option<CardRecord>> {
        let cards = self.cards.read().await;
        Ok(cards.get(card_number).cloned())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, CardRecord>> {
        let cards = self.cards.read().await;
        Ok(cards.clone())
    }
}

/// A thread-safe in-memory token store.
#[derive(Default, Clone)]
pub struct InMemoryTokenStore {
    tokens: Arc<RwLock<BTreeMap<String, TokenRecord>>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn store(&self, token: &str, record: TokenRecord) -> Result<()> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(token.to_string(), record);
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(token).cloned())
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        let mut tokens = self.tokens.write().await;
        Ok(tokens.remove(token).is_some())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, TokenRecord>> {
        let tokens = self.tokens.read().await;
        Ok(tokens.clone())
    }
}

/// Both mailboxes held in memory, keyed by direction.
#[derive(Default, Clone)]
pub struct InMemoryMailboxStore {
    mailboxes: Arc<RwLock<HashMap<Direction, Vec<MailboxEntry>>>>,
}

impl InMemoryMailboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MailboxStore for InMemoryMailboxStore {
    async fn load(&self, direction: Direction) -> Result<Vec<MailboxEntry>> {
        let mailboxes = self.mailboxes.read().await;
        Ok(mailboxes.get(&direction).cloned().unwrap_or_default())
    }

    async fn save(&self, direction: Direction, entries: &[MailboxEntry]) -> Result<()> {
        let mut mailboxes = self.mailboxes.write().await;
        mailboxes.insert(direction, entries.to_vec());
        Ok(())
    }
}

/// Rolling transaction log held in memory.
#[derive(Default, Clone)]
pub struct InMemoryHistoryStore {
    transactions: Arc<RwLock<VecDeque<Transaction>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, tx: Transaction, limit: usize) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.push_back(tx);
        while transactions.len() > limit {
            transactions.pop_front();
        }
        Ok(())
    }

    async fn recent(&self) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::CardFingerprint;
    use crate::domain::money::{Amount, Balance};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_in_memory_ledger_store() {
        let store = InMemoryLedgerStore::new();
        let record = CardRecord::new("12/25", Balance::new(dec!(1000.0)));

        store.store("4111111111111111", record.clone()).await.unwrap();
        let retrieved = store.get("4111111111111111").await.unwrap().unwrap();
        assert_eq!(retrieved, record);

        assert!(store.get("5500000000000004").await.unwrap().is_none());
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_token_store_remove() {
        let store = InMemoryTokenStore::new();
        let record = TokenRecord {
            card_number: "4111111111111111".to_string(),
            expiry: "12/25".to_string(),
            masked: "**** **** **** 1111".to_string(),
            created_at: chrono::Utc::now(),
        };
        store.store("abc", record).await.unwrap();

        assert!(store.remove("abc").await.unwrap());
        assert!(!store.remove("abc").await.unwrap());
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_mailboxes_are_independent() {
        let store = InMemoryMailboxStore::new();
        store
            .save(Direction::MerchantToProcessor, &[MailboxEntry::new("a")])
            .await
            .unwrap();

        assert_eq!(store.load(Direction::MerchantToProcessor).await.unwrap().len(), 1);
        assert!(store.load(Direction::ProcessorToMerchant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_history_is_bounded() {
        let store = InMemoryHistoryStore::new();
        for i in 0..5 {
            let tx = Transaction::new(
                format!("TXN_{}", i),
                CardFingerprint::of("4111111111111111"),
                Amount::new(dec!(1)).unwrap(),
            );
            store.append(tx, 3).await.unwrap();
        }

        let recent = store.recent().await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|tx| tx.id.as_str()).collect();
        assert_eq!(ids, vec!["TXN_2", "TXN_3", "TXN_4"]);
    }
}
