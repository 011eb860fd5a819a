//! Device key storage.
//!
//! A [KeyStore] resolves a [KeyAlias] to an opaque handle and signs digests with it.
//! Private key material never crosses this boundary.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use signature::hazmat::PrehashSigner;

use crate::definitions::KeyAlias;

/// Length of the SHA-256 digest the device key signs.
pub const DIGEST_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("key not found: {0}")]
    KeyNotFound(KeyAlias),
    #[error("signing failed: {0}")]
    Signing(anyhow::Error),
}

/// Capability-scoped access to device keys.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Reference to a resolved key. Does not expose the key material.
    type Handle: Send + Sync;

    fn resolve(&self, alias: &KeyAlias) -> Result<Self::Handle, KeyStoreError>;

    /// Signs a SHA-256 `digest` of the payload.
    ///
    /// May involve a round trip to secure hardware.
    async fn sign(&self, handle: &Self::Handle, digest: &[u8]) -> Result<Vec<u8>, KeyStoreError>;
}

/// In-memory P-256 key store.
///
/// Produces DER encoded ECDSA signatures. Keys are zeroized when the last
/// handle referencing them is dropped.
#[derive(Default)]
pub struct SoftwareKeyStore {
    keys: HashMap<KeyAlias, Arc<SigningKey>>,
}

/// Handle to a key in a [SoftwareKeyStore].
#[derive(Clone)]
pub struct SoftwareKeyHandle {
    alias: KeyAlias,
    key: Arc<SigningKey>,
}

impl SoftwareKeyHandle {
    pub fn alias(&self) -> &KeyAlias {
        &self.alias
    }
}

impl fmt::Debug for SoftwareKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareKeyHandle")
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for SoftwareKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareKeyStore")
            .field("aliases", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SoftwareKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a fresh key under `alias`, replacing any previous one.
    pub fn generate(&mut self, alias: impl Into<KeyAlias>) -> VerifyingKey {
        self.insert(alias, SigningKey::random(&mut OsRng))
    }

    /// Imports `key` under `alias`, replacing any previous one.
    pub fn insert(&mut self, alias: impl Into<KeyAlias>, key: SigningKey) -> VerifyingKey {
        let verifying_key = *key.verifying_key();
        self.keys.insert(alias.into(), Arc::new(key));
        verifying_key
    }

    pub fn remove(&mut self, alias: &KeyAlias) -> bool {
        self.keys.remove(alias).is_some()
    }

    pub fn verifying_key(&self, alias: &KeyAlias) -> Option<VerifyingKey> {
        self.keys.get(alias).map(|key| *key.verifying_key())
    }
}

#[async_trait]
impl KeyStore for SoftwareKeyStore {
    type Handle = SoftwareKeyHandle;

    fn resolve(&self, alias: &KeyAlias) -> Result<Self::Handle, KeyStoreError> {
        self.keys
            .get(alias)
            .map(|key| SoftwareKeyHandle {
                alias: alias.clone(),
                key: Arc::clone(key),
            })
            .ok_or_else(|| KeyStoreError::KeyNotFound(alias.clone()))
    }

    async fn sign(&self, handle: &Self::Handle, digest: &[u8]) -> Result<Vec<u8>, KeyStoreError> {
        if digest.len() != DIGEST_LEN {
            return Err(KeyStoreError::Signing(anyhow::anyhow!(
                "expected a {DIGEST_LEN} byte digest, got {} bytes",
                digest.len()
            )));
        }
        let signature: Signature = handle
            .key
            .sign_prehash(digest)
            .map_err(|e| KeyStoreError::Signing(anyhow::anyhow!("unable to sign digest: {e}")))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}
