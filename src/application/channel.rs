//! Duplex mailbox between the merchant and the processor.
//!
//! Each direction is an append-only list of [`MailboxEntry`] values kept in a
//! [`MailboxStore`]. Receiving marks the oldest undelivered entry as delivered
//! instead of removing it. Every read-modify-write on a mailbox runs under
//! that direction's lock, so an entry is handed to exactly one receiver and
//! entries come out in the order they went in.
//!
//! The channel does not pair responses with requests. Receivers correlate on
//! the transaction id inside the decrypted envelope.

use crate::domain::mailbox::{Direction, MailboxEntry};
use crate::domain::ports::MailboxStoreBox;
use crate::error::Result;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

pub struct MessageChannel {
    store: MailboxStoreBox,
    locks: [Mutex<()>; 2],
    poll_interval: Duration,
}

impl MessageChannel {
    /// Creates a channel over `store`, polling every `poll_interval` while
    /// waiting in [`MessageChannel::receive_blocking`].
    pub fn new(store: MailboxStoreBox, poll_interval: Duration) -> Self {
        Self {
            store,
            locks: [Mutex::new(()), Mutex::new(())],
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Appends `ciphertext` to the mailbox and returns the new entry's id.
    pub async fn send(&self, direction: Direction, ciphertext: String) -> Result<String> {
        let _guard = self.locks[direction.index()].lock().await;
        let mut entries = self.store.load(direction).await?;
        let entry = MailboxEntry::new(ciphertext);
        let id = entry.id.clone();
        info!(%direction, message_id = entry.short_id(), "message sent");
        entries.push(entry);
        self.store.save(direction, &entries).await?;
        Ok(id)
    }

    /// Takes the oldest undelivered message, if any, without waiting.
    pub async fn receive_non_blocking(&self, direction: Direction) -> Result<Option<String>> {
        let _guard = self.locks[direction.index()].lock().await;
        let mut entries = self.store.load(direction).await?;
        let Some(entry) = entries.iter_mut().find(|entry| !entry.delivered) else {
            return Ok(None);
        };
        entry.delivered = true;
        let message = entry.message.clone();
        info!(%direction, message_id = entry.short_id(), "message received");
        self.store.save(direction, &entries).await?;
        Ok(Some(message))
    }

    /// Polls until a message arrives or `timeout` elapses.
    ///
    /// Returns `None` on timeout. Only the calling task is suspended.
    pub async fn receive_blocking(
        &self,
        direction: Direction,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(message) = self.receive_non_blocking(direction).await? {
                return Ok(Some(message));
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(%direction, ?timeout, "no message before deadline");
                return Ok(None);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Number of entries not yet delivered.
    pub async fn pending(&self, direction: Direction) -> Result<usize> {
        let _guard = self.locks[direction.index()].lock().await;
        let entries = self.store.load(direction).await?;
        Ok(entries.iter().filter(|entry| !entry.delivered).count())
    }

    /// Empties both mailboxes, audit trail included.
    pub async fn clear(&self) -> Result<()> {
        for direction in Direction::ALL {
            let _guard = self.locks[direction.index()].lock().await;
            self.store.save(direction, &[]).await?;
        }
        Ok(())
    }
}
