//! Authenticated encryption for auth material at rest
//!
//! Every credential the gateway persists goes through this vault:
//! AES-256-GCM with a fresh 96-bit nonce per message and a 128-bit tag,
//! keyed by SHA-256 of an environment-supplied secret. Ciphertext is
//! serialized as `nonce:tag:ciphertext`, all lowercase hex, so blobs are
//! printable and self-describing enough for the [`looks_encrypted`]
//! predicate.
//!
//! Decryption failure is a hard [`VaultError::DecryptFailed`]. Whether a
//! caller downgrades that to a safe default is its own configured decision;
//! the vault never masks it.

use aes_gcm::{AeadInPlace, Aes256Gcm, KeyInit, Nonce, Tag};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Environment variable holding the vault secret.
pub const ENCRYPTION_KEY_VAR: &str = "ENCRYPTION_KEY";

/// Minimum length of the environment-supplied secret.
pub const MIN_SECRET_LEN: usize = 32;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors raised by the credential vault
#[derive(Debug, Error)]
pub enum VaultError {
    /// The configured secret is absent in an environment that requires it
    #[error("encryption secret is not configured ({0} unset)")]
    KeyMissing(&'static str),

    /// The configured secret is shorter than [`MIN_SECRET_LEN`]
    #[error("encryption secret must be at least {MIN_SECRET_LEN} characters, got {length}")]
    KeyTooShort { length: usize },

    /// The blob does not have the `nonce:tag:ciphertext` hex shape
    #[error("ciphertext is not in nonce:tag:ciphertext form")]
    MalformedCiphertext,

    /// Authentication tag mismatch or corrupted ciphertext
    #[error("decryption failed: ciphertext integrity check did not pass")]
    DecryptFailed,

    /// The cipher rejected the plaintext
    #[error("encryption failed: {0}")]
    EncryptFailed(String),

    /// JSON (de)serialization of the plaintext payload failed
    #[error("credential serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Process-wide symmetric vault for credential blobs.
#[derive(Clone)]
pub struct CredentialVault {
    key: [u8; 32],
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of debug output
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Derive the vault key from a secret string via SHA-256.
    pub fn from_secret(secret: &str) -> VaultResult<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(VaultError::KeyTooShort {
                length: secret.len(),
            });
        }
        let digest = Sha256::digest(secret.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Ok(Self { key })
    }

    /// Read the secret from [`ENCRYPTION_KEY_VAR`].
    ///
    /// In production the variable is mandatory and failures are fatal.
    /// Outside production a missing or short secret logs a warning and an
    /// ephemeral random key is used instead, so encrypted rows do not
    /// survive a restart.
    pub fn from_env(production: bool) -> VaultResult<Self> {
        match std::env::var(ENCRYPTION_KEY_VAR) {
            Ok(secret) => match Self::from_secret(&secret) {
                Ok(vault) => Ok(vault),
                Err(err) if production => Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "invalid {}; using ephemeral key", ENCRYPTION_KEY_VAR);
                    Ok(Self::ephemeral())
                }
            },
            Err(_) if production => Err(VaultError::KeyMissing(ENCRYPTION_KEY_VAR)),
            Err(_) => {
                tracing::warn!(
                    "{} is unset; using ephemeral key - encrypted data will not survive a restart",
                    ENCRYPTION_KEY_VAR
                );
                Ok(Self::ephemeral())
            }
        }
    }

    /// A vault with a random, process-local key.
    pub fn ephemeral() -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Encrypt a plaintext into the `nonce:tag:ciphertext` hex form.
    pub fn encrypt(&self, plaintext: &[u8]) -> VaultResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.key));
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(nonce, b"", &mut buffer)
            .map_err(|e| VaultError::EncryptFailed(e.to_string()))?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(buffer)
        ))
    }

    /// Decrypt a `nonce:tag:ciphertext` blob.
    pub fn decrypt(&self, blob: &str) -> VaultResult<Vec<u8>> {
        let (nonce_bytes, tag_bytes, mut buffer) = split_blob(blob)?;

        let cipher = Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(&nonce_bytes);
        let tag = Tag::from_slice(&tag_bytes);

        cipher
            .decrypt_in_place_detached(nonce, b"", &mut buffer, tag)
            .map_err(|_| VaultError::DecryptFailed)?;

        Ok(buffer)
    }

    /// Serialize a value to JSON and encrypt it.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> VaultResult<String> {
        let plaintext = serde_json::to_vec(value)?;
        self.encrypt(&plaintext)
    }

    /// Decrypt a blob and parse the plaintext as JSON.
    pub fn decrypt_json<T: DeserializeOwned>(&self, blob: &str) -> VaultResult<T> {
        let plaintext = self.decrypt(blob)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Whether a string has the `nonce:tag:ciphertext` hex shape produced by
/// [`CredentialVault::encrypt`]. Used by repositories to tell encrypted
/// rows from legacy cleartext before attempting decryption.
pub fn looks_encrypted(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return false;
    }
    let (nonce, tag, ciphertext) = (parts[0], parts[1], parts[2]);
    nonce.len() == NONCE_LEN * 2
        && tag.len() == TAG_LEN * 2
        && ciphertext.len() % 2 == 0
        && parts.iter().all(|part| is_lower_hex(part))
}

fn is_lower_hex(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn split_blob(blob: &str) -> VaultResult<([u8; NONCE_LEN], [u8; TAG_LEN], Vec<u8>)> {
    let parts: Vec<&str> = blob.split(':').collect();
    if parts.len() != 3 {
        return Err(VaultError::MalformedCiphertext);
    }

    let nonce_vec = hex::decode(parts[0]).map_err(|_| VaultError::MalformedCiphertext)?;
    let tag_vec = hex::decode(parts[1]).map_err(|_| VaultError::MalformedCiphertext)?;
    let ciphertext = hex::decode(parts[2]).map_err(|_| VaultError::MalformedCiphertext)?;

    let nonce: [u8; NONCE_LEN] = nonce_vec
        .try_into()
        .map_err(|_| VaultError::MalformedCiphertext)?;
    let tag: [u8; TAG_LEN] = tag_vec
        .try_into()
        .map_err(|_| VaultError::MalformedCiphertext)?;

    Ok((nonce, tag, ciphertext))
}
