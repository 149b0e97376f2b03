//! Assembly of both roles over one set of stores.

use super::channel::MessageChannel;
use super::guard::{FormatVerifier, VerificationGuard};
use super::ledger::Ledger;
use super::merchant::Merchant;
use super::processor::Processor;
use super::risk::{RandomScorer, RiskEngine, RiskScorer};
use super::vault::TokenVault;
use crate::config::Config;
use crate::domain::ports::{HistoryStoreBox, LedgerStoreBox, MailboxStoreBox, TokenStoreBox};
use crate::domain::validation::CardValidator;
use crate::error::Result;
use crate::infrastructure::cipher::CipherService;
use crate::infrastructure::in_memory::{
    InMemoryHistoryStore, InMemoryLedgerStore, InMemoryMailboxStore, InMemoryTokenStore,
};
use crate::infrastructure::json_file::{JsonFileStore, PAYMENT_LOG_FILE};
use std::path::Path;
use std::sync::Arc;

/// Storage backends for every port.
pub struct Stores {
    pub ledger: LedgerStoreBox,
    pub tokens: TokenStoreBox,
    pub mailboxes: MailboxStoreBox,
    pub transactions: HistoryStoreBox,
    pub payment_log: HistoryStoreBox,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            ledger: Box::new(InMemoryLedgerStore::new()),
            tokens: Box::new(InMemoryTokenStore::new()),
            mailboxes: Box::new(InMemoryMailboxStore::new()),
            transactions: Box::new(InMemoryHistoryStore::new()),
            payment_log: Box::new(InMemoryHistoryStore::new()),
        }
    }

    /// JSON files under `dir`, plus the cipher over the key file kept there.
    pub fn json_files(dir: &Path) -> Result<(Self, CipherService)> {
        let store = JsonFileStore::open(dir)?;
        let cipher = CipherService::load_or_create(&store.key_path())?;
        let stores = Self {
            ledger: Box::new(store.clone()),
            tokens: Box::new(store.clone()),
            mailboxes: Box::new(store.clone()),
            payment_log: Box::new(store.with_history_file(PAYMENT_LOG_FILE)),
            transactions: Box::new(store),
        };
        Ok((stores, cipher))
    }
}

pub struct Network {
    pub channel: Arc<MessageChannel>,
    pub processor: Arc<Processor>,
    pub merchant: Merchant,
}

impl Network {
    /// Wires both roles with the random risk scorer.
    pub fn new(config: &Config, stores: Stores, cipher: CipherService) -> Self {
        let scorer = RandomScorer::new(&config.risk);
        Self::with_scorer(config, stores, cipher, Box::new(scorer))
    }

    pub fn with_scorer(
        config: &Config,
        stores: Stores,
        cipher: CipherService,
        scorer: Box<dyn RiskScorer>,
    ) -> Self {
        let validator = CardValidator::new(config.validator.min_expiry_year);
        let channel = Arc::new(MessageChannel::new(
            stores.mailboxes,
            config.channel.poll_interval(),
        ));
        let ledger = Arc::new(Ledger::new(stores.ledger));
        let risk = RiskEngine::new(validator, Arc::clone(&ledger), scorer, config.risk.clone());

        let processor = Arc::new(Processor::new(
            Arc::clone(&channel),
            cipher.clone(),
            risk,
            ledger,
            stores.transactions,
            config.processor.history_limit,
        ));
        let merchant = Merchant::new(
            Arc::clone(&channel),
            cipher,
            TokenVault::new(stores.tokens, config.vault.clone()),
            VerificationGuard::new(Box::new(FormatVerifier), &config.guard),
            validator,
            config.merchant.clone(),
            stores.payment_log,
        );

        Self {
            channel,
            processor,
            merchant,
        }
    }
}
