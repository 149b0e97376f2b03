use crate::domain::card::CardRecord;
use crate::domain::mailbox::{Direction, MailboxEntry};
use crate::domain::ports::{HistoryStore, LedgerStore, MailboxStore, TokenStore};
use crate::domain::token::TokenRecord;
use crate::domain::transaction::Transaction;
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, VecDeque};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

pub const LEDGER_FILE: &str = "ledger.json";
pub const TOKENS_FILE: &str = "tokens.json";
pub const TRANSACTIONS_FILE: &str = "transactions.json";
pub const PAYMENT_LOG_FILE: &str = "payment_log.json";
pub const KEY_FILE: &str = "channel.key";

/// A persistent store that keeps each collection in its own JSON file.
///
/// Files live in one data directory and are rewritten whole through a
/// temporary file and a rename, so a reader never sees a half-written file.
/// A missing or empty file reads as an empty collection.
///
/// `Clone` shares the write lock, so clones never interleave a
/// read-modify-write on the same file.
#[derive(Clone)]
pub struct JsonFileStore {
    root: Arc<PathBuf>,
    history_file: &'static str,
    write_lock: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Opens (creating if needed) the data directory at `path`.
    ///
    /// Transaction history goes to `transactions.json`; see
    /// [`JsonFileStore::with_history_file`] for the merchant's payment log.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        std::fs::create_dir_all(path.as_ref())?;
        Ok(Self {
            root: Arc::new(path.as_ref().to_path_buf()),
            history_file: TRANSACTIONS_FILE,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Same directory, with history appended to `file_name` instead.
    pub fn with_history_file(&self, file_name: &'static str) -> Self {
        Self {
            root: Arc::clone(&self.root),
            history_file: file_name,
            write_lock: Arc::clone(&self.write_lock),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn key_path(&self) -> PathBuf {
        self.root.join(KEY_FILE)
    }

    fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    fn mailbox_path(&self, direction: Direction) -> PathBuf {
        self.path(&format!("{}.json", direction.as_str()))
    }
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(T::default()),
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl LedgerStore for JsonFileStore {
    async fn store(&self, card_number: &str, record: CardRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(LEDGER_FILE);
        let mut cards: BTreeMap<String, CardRecord> = read_json(&path)?;
        cards.insert(card_number.to_string(), record);
        write_json(&path, &cards)
    }

    async fn get(&self, card_number: &str) -> Result<Option<CardRecord>> {
        let mut cards: BTreeMap<String, CardRecord> = read_json(&self.path(LEDGER_FILE))?;
        Ok(cards.remove(card_number))
    }

    async fn get_all(&self) -> Result<BTreeMap<String, CardRecord>> {
        read_json(&self.path(LEDGER_FILE))
    }
}

#[async_trait]
impl TokenStore for JsonFileStore {
    async fn store(&self, token: &str, record: TokenRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(TOKENS_FILE);
        let mut tokens: BTreeMap<String, TokenRecord> = read_json(&path)?;
        tokens.insert(token.to_string(), record);
        write_json(&path, &tokens)
    }

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>> {
        let mut tokens: BTreeMap<String, TokenRecord> = read_json(&self.path(TOKENS_FILE))?;
        Ok(tokens.remove(token))
    }

    async fn remove(&self, token: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(TOKENS_FILE);
        let mut tokens: BTreeMap<String, TokenRecord> = read_json(&path)?;
        let removed = tokens.remove(token).is_some();
        if removed {
            write_json(&path, &tokens)?;
        }
        Ok(removed)
    }

    async fn get_all(&self) -> Result<BTreeMap<String, TokenRecord>> {
        read_json(&self.path(TOKENS_FILE))
    }
}

#[async_trait]
impl MailboxStore for JsonFileStore {
    async fn load(&self, direction: Direction) -> Result<Vec<MailboxEntry>> {
        read_json(&self.mailbox_path(direction))
    }

    async fn save(&self, direction: Direction, entries: &[MailboxEntry]) -> Result<()> {
        write_json(&self.mailbox_path(direction), entries)
    }
}

#[async_trait]
impl HistoryStore for JsonFileStore {
    async fn append(&self, tx: Transaction, limit: usize) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(self.history_file);
        let mut transactions: VecDeque<Transaction> = read_json(&path)?;
        transactions.push_back(tx);
        while transactions.len() > limit {
            transactions.pop_front();
        }
        write_json(&path, &transactions)
    }

    async fn recent(&self) -> Result<Vec<Transaction>> {
        read_json(&self.path(self.history_file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::card::CardFingerprint;
    use crate::domain::money::{Amount, Balance};
    use crate::error::PaymentError;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_json_ledger_store() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let record = CardRecord::new("12/25", Balance::new(dec!(1000.00)));
        LedgerStore::store(&store, "4111111111111111", record.clone())
            .await
            .unwrap();

        let retrieved = LedgerStore::get(&store, "4111111111111111")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retrieved, record);
        assert!(LedgerStore::get(&store, "0000").await.unwrap().is_none());

        // A fresh handle on the same directory sees the same data.
        let reopened = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(LedgerStore::get_all(&reopened).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_ledger_reads_hand_written_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(LEDGER_FILE),
            r#"{"4111111111111111": {"expiry": "12/25", "balance": 1000.0, "cardholder": "John Doe", "type": "Visa"}}"#,
        )
        .unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let record = LedgerStore::get(&store, "4111111111111111")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.balance, Balance::new(dec!(1000.0)));
        assert_eq!(record.card_type.as_deref(), Some("Visa"));
    }

    #[tokio::test]
    async fn test_json_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(TOKENS_FILE), "{not json").unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let result = TokenStore::get_all(&store).await;
        assert!(matches!(result, Err(PaymentError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_json_mailbox_wire_form() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();

        let entry = MailboxEntry::new("ciphertext");
        store
            .save(Direction::MerchantToProcessor, &[entry.clone()])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("merchant_to_processor.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json[0]["message"], "ciphertext");
        assert_eq!(json[0]["delivered"], false);
        assert!(json[0]["enqueued_at"].is_f64());

        let loaded = store.load(Direction::MerchantToProcessor).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, entry.id);
        assert!(!loaded[0].delivered);
        assert!(store.load(Direction::ProcessorToMerchant).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_json_history_files_are_separate() {
        let dir = tempdir().unwrap();
        let processor = JsonFileStore::open(dir.path()).unwrap();
        let merchant = processor.with_history_file(PAYMENT_LOG_FILE);

        for i in 0..4 {
            let tx = Transaction::new(
                format!("TXN_{}", i),
                CardFingerprint::of("4111111111111111"),
                Amount::new(dec!(1)).unwrap(),
            );
            processor.append(tx, 2).await.unwrap();
        }

        assert_eq!(processor.recent().await.unwrap().len(), 2);
        assert!(merchant.recent().await.unwrap().is_empty());
        assert!(dir.path().join(TRANSACTIONS_FILE).exists());
    }
}
