use super::channel::MessageChannel;
use super::guard::VerificationGuard;
use super::vault::TokenVault;
use crate::config::MerchantConfig;
use crate::domain::card::{CardData, normalize_card_number};
use crate::domain::envelope::{self, Envelope, MessageType, UNKNOWN_TRANSACTION_ID};
use crate::domain::mailbox::Direction;
use crate::domain::money::Amount;
use crate::domain::ports::HistoryStoreBox;
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::domain::validation::CardValidator;
use crate::error::{PaymentError, Result};
use crate::infrastructure::cipher::CipherService;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// A payment as entered at the merchant.
///
/// With a token, `card.number` and `card.expiry` are ignored and taken from
/// the vault; `card.cvv` must still be supplied.
#[derive(Debug, Clone)]
pub struct PaymentSubmission {
    pub card: CardData,
    pub amount: Amount,
    pub token: Option<String>,
    pub save_token: bool,
}

impl PaymentSubmission {
    pub fn new(card: CardData, amount: Amount) -> Self {
        Self {
            card,
            amount,
            token: None,
            save_token: false,
        }
    }

    pub fn with_token(cvv: impl Into<String>, token: impl Into<String>, amount: Amount) -> Self {
        Self {
            card: CardData::new("", "", cvv),
            amount,
            token: Some(token.into()),
            save_token: false,
        }
    }

    pub fn save_token(mut self, save: bool) -> Self {
        self.save_token = save;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOutcome {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub reason: String,
    pub amount: Amount,
    pub masked_card: String,
    pub authorization_code: Option<String>,
    /// Token issued for this card by this submission, if any.
    pub token: Option<String>,
}

impl PaymentOutcome {
    pub fn is_approved(&self) -> bool {
        self.status == TransactionStatus::Approved
    }
}

impl fmt::Display for PaymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payment {}: {}", self.status, self.reason)
    }
}

/// Requests still waiting for a reply, and replies that arrived for them
/// while another submission was reading the channel.
#[derive(Debug, Default)]
struct PendingReplies {
    in_flight: HashSet<String>,
    unclaimed: HashMap<String, Envelope>,
}

/// Marks a transaction as awaiting its reply until dropped.
struct InFlight<'a> {
    replies: &'a Mutex<PendingReplies>,
    transaction_id: String,
}

impl<'a> InFlight<'a> {
    fn start(replies: &'a Mutex<PendingReplies>, transaction_id: &str) -> Self {
        replies.lock().in_flight.insert(transaction_id.to_string());
        Self {
            replies,
            transaction_id: transaction_id.to_string(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut replies = self.replies.lock();
        replies.in_flight.remove(&self.transaction_id);
        replies.unclaimed.remove(&self.transaction_id);
    }
}

/// Merchant side of the exchange.
///
/// Checks the card locally, sends an encrypted request and waits for the
/// processor's reply. Replies for other submissions still waiting are kept
/// aside for their owners; late replies to abandoned requests are dropped.
pub struct Merchant {
    channel: Arc<MessageChannel>,
    cipher: CipherService,
    vault: TokenVault,
    guard: VerificationGuard,
    validator: CardValidator,
    config: MerchantConfig,
    payment_log: HistoryStoreBox,
    replies: Mutex<PendingReplies>,
}

impl Merchant {
    pub fn new(
        channel: Arc<MessageChannel>,
        cipher: CipherService,
        vault: TokenVault,
        guard: VerificationGuard,
        validator: CardValidator,
        config: MerchantConfig,
        payment_log: HistoryStoreBox,
    ) -> Self {
        Self {
            channel,
            cipher,
            vault,
            guard,
            validator,
            config,
            payment_log,
            replies: Mutex::new(PendingReplies::default()),
        }
    }

    pub fn vault(&self) -> &TokenVault {
        &self.vault
    }

    /// Outcomes received so far, oldest first.
    pub async fn payment_log(&self) -> Result<Vec<Transaction>> {
        self.payment_log.recent().await
    }

    pub async fn submit(&self, submission: PaymentSubmission) -> Result<PaymentOutcome> {
        let PaymentSubmission {
            mut card,
            amount,
            token,
            save_token,
        } = submission;

        if let Some(token) = &token {
            let resolved = self.vault.resolve(token).await?;
            card.number = resolved.card_number;
            card.expiry = resolved.expiry;
        } else {
            card.number = normalize_card_number(&card.number);
        }

        self.validator
            .validate_account(&card, token.is_none())
            .map_err(PaymentError::ValidationError)?;
        let guard_key = token.as_deref().unwrap_or(&card.number);
        self.guard.check(guard_key, &card.cvv).await?;

        let masked_card = card.masked();
        let request = envelope::payment_request(
            card.clone(),
            amount,
            token.clone(),
            &self.config.merchant_id,
        )?;
        let transaction_id = request.transaction_id().to_string();
        let in_flight = InFlight::start(&self.replies, &transaction_id);
        self.channel
            .send(Direction::MerchantToProcessor, self.cipher.encrypt(&request)?)
            .await?;
        info!(%transaction_id, card = %masked_card, %amount, "payment request sent");

        let reply = self.await_reply(&transaction_id).await;
        drop(in_flight);
        let mut outcome = Self::read_reply(&reply?, &transaction_id, amount, &masked_card)?;

        // The processor has already settled this payment.
        if outcome.is_approved() && save_token && token.is_none() {
            match self.vault.issue(&card.number, &card.expiry).await {
                Ok(issued) => outcome.token = Some(issued),
                Err(e) => warn!(%transaction_id, error = %e, "could not issue token"),
            }
        }

        let mut record = Transaction::new(&transaction_id, card.fingerprint(), amount);
        record.finalize(outcome.status, &outcome.reason)?;
        if let Err(e) = self
            .payment_log
            .append(record, self.config.payment_log_limit)
            .await
        {
            warn!(%transaction_id, error = %e, "could not record payment");
        }
        info!(%transaction_id, status = %outcome.status, reason = %outcome.reason, "payment finished");
        Ok(outcome)
    }

    fn read_reply(
        reply: &Envelope,
        transaction_id: &str,
        amount: Amount,
        masked_card: &str,
    ) -> Result<PaymentOutcome> {
        match reply.message_type() {
            MessageType::PaymentResponse => {
                let response = reply.payment_response()?;
                Ok(PaymentOutcome {
                    transaction_id: transaction_id.to_string(),
                    status: response.status,
                    reason: response.reason,
                    amount: response.amount,
                    masked_card: response.masked_card,
                    authorization_code: response.authorization_code,
                    token: None,
                })
            }
            MessageType::Error => Ok(PaymentOutcome {
                transaction_id: transaction_id.to_string(),
                status: TransactionStatus::Error,
                reason: reply.error_payload()?.error,
                amount,
                masked_card: masked_card.to_string(),
                authorization_code: None,
                token: None,
            }),
            other => Err(PaymentError::MalformedEnvelope(format!(
                "Unexpected reply type: {:?}",
                other
            ))),
        }
    }

    /// Waits for the reply to `transaction_id`.
    ///
    /// An error reply under the unknown id is taken as ours since the
    /// processor could not tell whose request it was.
    async fn await_reply(&self, transaction_id: &str) -> Result<Envelope> {
        let timeout = self.config.response_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let stashed = self.replies.lock().unclaimed.remove(transaction_id);
            if let Some(reply) = stashed {
                return Ok(reply);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(%transaction_id, "no reply from processor");
                return Err(PaymentError::Timeout(timeout.as_secs()));
            }

            let wait = remaining.min(self.channel.poll_interval());
            let Some(ciphertext) = self
                .channel
                .receive_blocking(Direction::ProcessorToMerchant, wait)
                .await?
            else {
                continue;
            };

            let reply = match self.cipher.decrypt(&ciphertext) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "dropping unreadable reply");
                    continue;
                }
            };
            if reply.transaction_id() == transaction_id
                || (reply.message_type() == MessageType::Error
                    && reply.transaction_id() == UNKNOWN_TRANSACTION_ID)
            {
                return Ok(reply);
            }
            self.stash(reply);
        }
    }

    fn stash(&self, reply: Envelope) {
        let mut replies = self.replies.lock();
        let owner = reply.transaction_id().to_string();
        if replies.in_flight.contains(&owner) {
            replies.unclaimed.insert(owner, reply);
        } else {
            warn!(transaction_id = %owner, "dropping reply nobody is waiting for");
        }
    }
}
