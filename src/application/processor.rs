use super::channel::MessageChannel;
use super::ledger::{Ledger, Settlement};
use super::risk::{Assessment, RiskEngine};
use crate::domain::card::normalize_card_number;
use crate::domain::envelope::{self, Envelope, MessageType, PaymentRequest, UNKNOWN_TRANSACTION_ID};
use crate::domain::mailbox::Direction;
use crate::domain::ports::HistoryStoreBox;
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::error::{PaymentError, Result};
use crate::infrastructure::cipher::CipherService;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Point-in-time copy of the processor counters.
///
/// `total == approved + declined` and `fraud <= declined` always hold: a fraud
/// flag counts as a decline too.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub total: u64,
    pub approved: u64,
    pub declined: u64,
    pub fraud: u64,
}

#[derive(Debug, Default)]
struct Statistics {
    counters: Mutex<StatisticsSnapshot>,
}

impl Statistics {
    fn record(&self, status: TransactionStatus) {
        let mut counters = self.counters.lock();
        match status {
            TransactionStatus::Approved => counters.approved += 1,
            TransactionStatus::Declined => counters.declined += 1,
            TransactionStatus::Fraud => {
                counters.fraud += 1;
                counters.declined += 1;
            }
            TransactionStatus::Pending | TransactionStatus::Error => return,
        }
        counters.total += 1;
    }

    fn snapshot(&self) -> StatisticsSnapshot {
        *self.counters.lock()
    }

    fn reset(&self) {
        *self.counters.lock() = StatisticsSnapshot::default();
    }
}

/// Bank side of the exchange.
///
/// Takes encrypted requests off the merchant-to-processor mailbox, runs them
/// through the risk engine, settles approvals against the ledger and always
/// sends an encrypted reply, even when the request could not be read.
pub struct Processor {
    channel: Arc<MessageChannel>,
    cipher: CipherService,
    risk: RiskEngine,
    ledger: Arc<Ledger>,
    history: HistoryStoreBox,
    history_limit: usize,
    statistics: Statistics,
}

impl Processor {
    pub fn new(
        channel: Arc<MessageChannel>,
        cipher: CipherService,
        risk: RiskEngine,
        ledger: Arc<Ledger>,
        history: HistoryStoreBox,
        history_limit: usize,
    ) -> Self {
        Self {
            channel,
            cipher,
            risk,
            ledger,
            history,
            history_limit,
            statistics: Statistics::default(),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    pub fn reset_statistics(&self) {
        self.statistics.reset();
    }

    /// Most recent terminal transactions, oldest first.
    pub async fn history(&self) -> Result<Vec<Transaction>> {
        self.history.recent().await
    }

    /// Handles one request if the inbound mailbox has any.
    pub async fn process_next(&self) -> Result<Option<Transaction>> {
        match self
            .channel
            .receive_non_blocking(Direction::MerchantToProcessor)
            .await?
        {
            Some(ciphertext) => self.handle(&ciphertext).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drains the inbound mailbox and returns how many messages were taken.
    ///
    /// A failure on one message is logged and does not stop the drain.
    pub async fn process_pending(&self) -> Result<usize> {
        let mut processed = 0;
        while let Some(ciphertext) = self
            .channel
            .receive_non_blocking(Direction::MerchantToProcessor)
            .await?
        {
            processed += 1;
            if let Err(e) = self.handle(&ciphertext).await {
                warn!(error = %e, "request rejected");
            }
        }
        Ok(processed)
    }

    /// Polls the inbound mailbox every `interval` until the task is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(?interval, "processor listening");
            loop {
                match self.process_pending().await {
                    Ok(0) => {}
                    Ok(count) => debug!(count, "processed requests"),
                    Err(e) => error!(error = %e, "processor poll failed"),
                }
                tokio::time::sleep(interval).await;
            }
        })
    }

    /// Processes one encrypted request and replies to it.
    ///
    /// Business declines come back as `Ok` with a terminal status. Requests
    /// that cannot be decrypted or read get an error reply and return `Err`.
    pub async fn handle(&self, ciphertext: &str) -> Result<Transaction> {
        let envelope = match self.cipher.decrypt(ciphertext) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "could not decrypt request");
                self.reply_error(UNKNOWN_TRANSACTION_ID, "Decryption failed")
                    .await?;
                return Err(e);
            }
        };

        let transaction_id = envelope.transaction_id().to_string();
        let request = match Self::read_request(&envelope) {
            Ok(request) => request,
            Err(e) => {
                warn!(%transaction_id, error = %e, "malformed request");
                let reply_id = if transaction_id.trim().is_empty() {
                    UNKNOWN_TRANSACTION_ID
                } else {
                    transaction_id.as_str()
                };
                self.reply_error(reply_id, &e.to_string()).await?;
                return Err(e);
            }
        };

        let card = &request.card_data;
        let mut transaction = Transaction::new(&transaction_id, card.fingerprint(), request.amount);
        info!(
            %transaction_id,
            card = %card.masked(),
            amount = %request.amount,
            merchant = %request.merchant_id,
            "verifying"
        );

        let (status, reason) = match self.settle(&request).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(%transaction_id, error = %e, "processing failed");
                (TransactionStatus::Error, "Processing error".to_string())
            }
        };
        transaction.finalize(status, &reason)?;
        info!(%transaction_id, %status, %reason, "transaction finished");

        let response = match envelope::payment_response(
            &transaction_id,
            status,
            &reason,
            request.amount,
            &card.masked(),
        ) {
            Ok(response) => response,
            Err(e) => {
                error!(%transaction_id, error = %e, "could not build response");
                self.reply_error(&transaction_id, "Processing error").await?;
                return Err(e);
            }
        };
        self.statistics.record(status);
        if let Err(e) = self
            .history
            .append(transaction.clone(), self.history_limit)
            .await
        {
            error!(%transaction_id, error = %e, "could not record transaction");
        }
        self.reply(&response).await?;
        Ok(transaction)
    }

    fn read_request(envelope: &Envelope) -> Result<PaymentRequest> {
        envelope::validate(envelope)?;
        match envelope.message_type() {
            MessageType::PaymentRequest => envelope.payment_request(),
            other => Err(PaymentError::MalformedEnvelope(format!(
                "Unsupported message type: {:?}",
                other
            ))),
        }
    }

    /// Runs the risk pipeline and, on approval, debits the live ledger.
    async fn settle(&self, request: &PaymentRequest) -> Result<(TransactionStatus, String)> {
        let assessment = self.risk.evaluate(&request.card_data, request.amount).await?;
        if let Assessment::Rejected { .. } = assessment {
            return Ok((assessment.status(), assessment.reason().to_string()));
        }

        let card_number = normalize_card_number(&request.card_data.number);
        match self
            .ledger
            .debit(&card_number, &request.card_data.expiry, request.amount)
            .await?
        {
            Settlement::Debited { .. } => Ok((
                TransactionStatus::Approved,
                assessment.reason().to_string(),
            )),
            Settlement::Rejected { reason } => Ok((TransactionStatus::Declined, reason)),
        }
    }

    async fn reply(&self, envelope: &Envelope) -> Result<()> {
        let ciphertext = self.cipher.encrypt(envelope)?;
        self.channel
            .send(Direction::ProcessorToMerchant, ciphertext)
            .await?;
        Ok(())
    }

    async fn reply_error(&self, transaction_id: &str, error: &str) -> Result<()> {
        let envelope = envelope::error_message(transaction_id, error)?;
        self.reply(&envelope).await
    }
}
