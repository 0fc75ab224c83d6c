//! Content-addressable blob store.
//!
//! Every blob is keyed by the SHA-256 of its content, so identical content
//! written from any number of tree versions lands on one entry. Blobs are
//! immutable and never deleted; retention is unbounded.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest key of a blob: lowercase hex SHA-256, 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobKey(String);

impl BlobKey {
    /// Wrap an already-computed hex digest (e.g. one read back from storage).
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deterministic digest of `content`.
#[must_use]
pub fn digest(content: &str) -> BlobKey {
    BlobKey(hex::encode(sha256(content.as_bytes())))
}

/// Raw SHA-256 of `bytes`. Also used to seed lazily-derived concept vectors.
#[must_use]
pub(crate) fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Immutable digest → content map.
///
/// Content is held behind `Arc<str>` so that cloning the store (which
/// happens whenever a snapshot is copied on write) only bumps refcounts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobStore {
    blobs: BTreeMap<BlobKey, Arc<str>>,
}

impl BlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` under its digest and return the key.
    ///
    /// Idempotent: writing identical content again returns the same key and
    /// leaves the store unchanged.
    pub fn put(&mut self, content: &str) -> BlobKey {
        let key = digest(content);
        self.blobs
            .entry(key.clone())
            .or_insert_with(|| Arc::from(content));
        key
    }

    /// Look up a blob. `None` is the not-found signal.
    #[must_use]
    pub fn get(&self, key: &BlobKey) -> Option<&str> {
        self.blobs.get(key).map(AsRef::as_ref)
    }

    /// Whether a blob exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &BlobKey) -> bool {
        self.blobs.contains_key(key)
    }

    /// Number of distinct blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Whether the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Iterate over `(key, content)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&BlobKey, &str)> {
        self.blobs.iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// Insert a blob read back from durable storage under its recorded key.
    ///
    /// The key is trusted here; call [`BlobStore::verify`] afterwards to find
    /// entries whose content no longer matches.
    pub(crate) fn insert_trusted(&mut self, key: BlobKey, content: &str) {
        self.blobs.entry(key).or_insert_with(|| Arc::from(content));
    }

    /// Union `other` into `self`. Existing entries win (they are identical by
    /// construction when keys agree).
    pub fn merge(&mut self, other: &BlobStore) {
        for (key, content) in &other.blobs {
            self.blobs
                .entry(key.clone())
                .or_insert_with(|| Arc::clone(content));
        }
    }

    /// Keys whose stored content does not hash back to the key.
    #[must_use]
    pub fn verify(&self) -> Vec<BlobKey> {
        self.blobs
            .iter()
            .filter(|(key, content)| digest(content) != **key)
            .map(|(key, _)| key.clone())
            .collect()
    }
}
