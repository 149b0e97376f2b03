use super::card::CardRecord;
use super::mailbox::{Direction, MailboxEntry};
use super::token::TokenRecord;
use super::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn store(&self, card_number: &str, record: CardRecord) -> Result<()>;
    async fn get(&self, card_number: &str) -> Result<Option<CardRecord>>;
    async fn get_all(&self) -> Result<BTreeMap<String, CardRecord>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn store(&self, token: &str, record: TokenRecord) -> Result<()>;
    async fn get(&self, token: &str) -> Result<Option<TokenRecord>>;
    /// Returns whether the token existed.
    async fn remove(&self, token: &str) -> Result<bool>;
    async fn get_all(&self) -> Result<BTreeMap<String, TokenRecord>>;
}

/// Persistence for the two mailboxes. Callers serialize access per direction.
#[async_trait]
pub trait MailboxStore: Send + Sync {
    async fn load(&self, direction: Direction) -> Result<Vec<MailboxEntry>>;
    async fn save(&self, direction: Direction, entries: &[MailboxEntry]) -> Result<()>;
}

/// Rolling log of terminal transactions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends `tx`, dropping the oldest entries beyond `limit`.
    async fn append(&self, tx: Transaction, limit: usize) -> Result<()>;
    async fn recent(&self) -> Result<Vec<Transaction>>;
}

pub type LedgerStoreBox = Box<dyn LedgerStore>;
pub type TokenStoreBox = Box<dyn TokenStore>;
pub type MailboxStoreBox = Box<dyn MailboxStore>;
pub type HistoryStoreBox = Box<dyn HistoryStore>;
