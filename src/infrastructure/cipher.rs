//! Symmetric encryption of protocol envelopes.
//!
//! AES-256-GCM with a random 96-bit nonce per message. The wire form is
//! `hex(nonce || ciphertext || tag)`, which keeps mailbox files plain text.
//!
//! The key is shared by both roles through a key file. A missing or
//! unreadable key file is replaced by a fresh key, which makes any message
//! still sitting in a mailbox undecryptable.

use crate::domain::envelope::Envelope;
use crate::error::{PaymentError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{info, warn};

pub const KEY_LENGTH: usize = 32;
pub const NONCE_LENGTH: usize = 12;

#[derive(Clone)]
pub struct CipherService {
    cipher: Aes256Gcm,
}

impl CipherService {
    pub fn new(key: &[u8; KEY_LENGTH]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| PaymentError::InternalError("invalid key length".to_string()))?;
        Ok(Self { cipher })
    }

    /// Service over a freshly generated, unpersisted key.
    pub fn ephemeral() -> Result<Self> {
        Self::new(&generate_key())
    }

    /// Loads the hex key at `path`, or generates and writes a new one when
    /// the file is absent or does not hold a valid key.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        match std::fs::read(path) {
            Ok(contents) => match std::str::from_utf8(&contents).ok().and_then(parse_key) {
                Some(key) => return Self::new(&key),
                None => warn!(path = %path.display(), "existing key invalid, generating new key"),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let key = generate_key();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, hex::encode(key))?;
        info!(path = %path.display(), "new encryption key generated");
        Self::new(&key)
    }

    pub fn encrypt(&self, envelope: &Envelope) -> Result<String> {
        self.seal(envelope)
    }

    /// Decrypts and parses an envelope.
    ///
    /// A wrong key or tampered ciphertext is `Decryption`; plaintext that is
    /// not an envelope is `MalformedEnvelope`.
    pub fn decrypt(&self, data: &str) -> Result<Envelope> {
        self.open(data)
    }

    /// Encrypts any serializable value as JSON.
    pub fn seal<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let plaintext = serde_json::to_vec(value)?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| PaymentError::InternalError("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(hex::encode(out))
    }

    /// Inverse of [`CipherService::seal`].
    pub fn open<T: DeserializeOwned>(&self, data: &str) -> Result<T> {
        let bytes = hex::decode(data.trim())
            .map_err(|_| PaymentError::Decryption("ciphertext is not valid hex".to_string()))?;
        if bytes.len() < NONCE_LENGTH {
            return Err(PaymentError::Decryption("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LENGTH);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| {
                PaymentError::Decryption("wrong key or corrupted ciphertext".to_string())
            })?;

        serde_json::from_slice(&plaintext).map_err(|e| PaymentError::MalformedEnvelope(e.to_string()))
    }
}

fn generate_key() -> [u8; KEY_LENGTH] {
    let mut key = [0u8; KEY_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

fn parse_key(contents: &str) -> Option<[u8; KEY_LENGTH]> {
    hex::decode(contents.trim()).ok()?.try_into().ok()
}
