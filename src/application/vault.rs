use crate::config::VaultConfig;
use crate::domain::card::{mask_card_number, normalize_card_number};
use crate::domain::ports::TokenStoreBox;
use crate::domain::token::{ResolvedCard, TokenRecord};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::info;

/// Merchant-side tokenization store.
///
/// Maps opaque tokens to the card number, expiry and a masked display. It
/// has no way to accept a verification code: every submission with a token
/// must bring its own.
pub struct TokenVault {
    store: TokenStoreBox,
    config: VaultConfig,
}

impl TokenVault {
    pub fn new(store: TokenStoreBox, config: VaultConfig) -> Self {
        Self { store, config }
    }

    /// Derives a token as `sha256(card || salt || timestamp)`, hex, truncated.
    fn derive_token(&self, card_number: &str) -> String {
        let salt = uuid::Uuid::new_v4();
        let timestamp = Utc::now().to_rfc3339();

        let mut hasher = Sha256::new();
        hasher.update(card_number.as_bytes());
        hasher.update(salt.as_bytes());
        hasher.update(timestamp.as_bytes());
        let digest = hex::encode(hasher.finalize());

        let length = self.config.token_length.clamp(1, digest.len());
        digest[..length].to_string()
    }

    pub async fn issue(&self, card_number: &str, expiry: &str) -> Result<String> {
        let card_number = normalize_card_number(card_number);
        for _ in 0..self.config.max_issue_attempts.max(1) {
            let token = self.derive_token(&card_number);
            if self.store.get(&token).await?.is_some() {
                continue;
            }

            let record = TokenRecord {
                masked: mask_card_number(&card_number),
                card_number: card_number.clone(),
                expiry: expiry.to_string(),
                created_at: Utc::now(),
            };
            info!(%token, masked = %record.masked, "token issued");
            self.store.store(&token, record).await?;
            return Ok(token);
        }

        Err(PaymentError::InternalError(
            "could not derive a unique token".to_string(),
        ))
    }

    pub async fn resolve(&self, token: &str) -> Result<ResolvedCard> {
        self.store
            .get(token)
            .await?
            .map(ResolvedCard::from)
            .ok_or_else(|| PaymentError::NotFound(format!("token {}", token)))
    }

    pub async fn revoke(&self, token: &str) -> Result<bool> {
        let removed = self.store.remove(token).await?;
        if removed {
            info!(%token, "token revoked");
        }
        Ok(removed)
    }

    /// Token id to masked card display.
    pub async fn list(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .store
            .get_all()
            .await?
            .into_iter()
            .map(|(token, record)| (token, record.masked))
            .collect())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.get_all().await?.len())
    }
}
