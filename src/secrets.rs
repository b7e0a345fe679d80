// Secret store contract: wallet secrets reach the engine encrypted and
// are materialized into a signing mnemonic for exactly one operation.
// The decrypted form is handed to the ledger client and never persisted.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};

pub trait SecretStore: Send + Sync {
    fn decrypt(&self, encrypted: &str) -> AppResult<String>;
}

/// Key-tagged base64 store for development and test deployments.
///
/// Payload format is `<base64(mnemonic)>.<hex sha256(key || payload)>`;
/// the tag binds the payload to the configured key so a record from a
/// differently-keyed environment is rejected. This is integrity, not
/// secrecy. Production deployments plug a KMS-backed implementation of
/// `SecretStore` instead.
pub struct TaggedSecretStore {
    key: String,
}

impl TaggedSecretStore {
    pub fn new(key: String) -> Self {
        Self { key }
    }

    /// Produce the stored form of a mnemonic; used by provisioning
    /// tooling and test fixtures
    pub fn seal(&self, mnemonic: &str) -> String {
        let payload = STANDARD.encode(mnemonic);
        format!("{}.{}", payload, self.tag(&payload))
    }

    fn tag(&self, payload: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(payload.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl SecretStore for TaggedSecretStore {
    fn decrypt(&self, encrypted: &str) -> AppResult<String> {
        let (payload, tag) = encrypted
            .split_once('.')
            .ok_or_else(|| AppError::Secret("malformed secret record".into()))?;

        if self.tag(payload) != tag {
            return Err(AppError::Secret("secret key mismatch".into()));
        }

        let raw = STANDARD
            .decode(payload)
            .map_err(|e| AppError::Secret(format!("bad secret encoding: {}", e)))?;

        String::from_utf8(raw).map_err(|e| AppError::Secret(format!("bad secret payload: {}", e)))
    }
}
