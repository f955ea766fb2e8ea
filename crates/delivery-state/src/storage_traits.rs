//! Storage trait definitions for the delivery ledger
//!
//! - `ContentDigest`: SHA-256 hex digest of a script's raw bytes
//! - `LedgerEntry`: one execution attempt of one script
//! - `DeliveryLedger`: the persisted record of attempts and outcomes
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// LedgerEntry
// ---------------------------------------------------------------------------

/// One execution attempt of a delivery script.
///
/// Entries are never updated in place: a fresh attempt appends a fresh entry,
/// and the latest entry for a name is the authoritative one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Script file name, including extension
    pub name: String,
    /// When the attempt that produced this entry ran
    pub execution_date: DateTime<Utc>,
    /// True iff every instruction completed with a "continue" outcome
    pub signed_for: bool,
    /// Digest of the script's raw bytes at execution time
    pub hash: ContentDigest,
}

impl LedgerEntry {
    /// Record an attempt that ran now.
    pub fn new(name: impl Into<String>, signed_for: bool, hash: ContentDigest) -> Self {
        Self {
            name: name.into(),
            execution_date: Utc::now(),
            signed_for,
            hash,
        }
    }

    /// Override the execution date (deterministic tests, imports).
    pub fn at(mut self, execution_date: DateTime<Utc>) -> Self {
        self.execution_date = execution_date;
        self
    }
}

// ---------------------------------------------------------------------------
// DeliveryLedger
// ---------------------------------------------------------------------------

/// Age after which an unreleased claim is considered abandoned.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(60 * 60);

/// Persisted record of which delivery scripts have run.
///
/// Guarantees:
/// - `save` appends; earlier entries for the same name are kept for audit.
/// - `find_by_name` returns the latest entry by execution date, or `None`.
/// - `claim` succeeds for at most one owner per name until released, or
///   until the claim outlives the ledger's lease. A holder that never
///   released within the lease is presumed dead and its claim is taken over.
///
/// `create` is not guaranteed to be idempotent; callers check `exists` first.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Probe whether the backing table is present.
    ///
    /// Returns `StorageError::Unavailable` when the store itself cannot be
    /// reached, as opposed to `Ok(false)` when it is reachable but empty.
    async fn exists(&self) -> StorageResult<bool>;

    /// Provision the backing tables.
    async fn create(&self) -> StorageResult<()>;

    /// Latest entry recorded for a script name.
    async fn find_by_name(&self, name: &str) -> StorageResult<Option<LedgerEntry>>;

    /// Append an attempt record.
    async fn save(&self, entry: &LedgerEntry) -> StorageResult<()>;

    /// Every entry, oldest first.
    async fn fetch_all(&self) -> StorageResult<Vec<LedgerEntry>>;

    /// Claim a script name for `owner`. Returns `false` if another owner holds it.
    async fn claim(&self, name: &str, owner: &str) -> StorageResult<bool>;

    /// Release a claim held by `owner`. No-op if not held.
    async fn release(&self, name: &str, owner: &str) -> StorageResult<()>;

    /// Drop any claim on `name` regardless of owner or age.
    /// Returns whether a claim was removed.
    async fn force_release(&self, name: &str) -> StorageResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_hex() {
        let a = ContentDigest::from_bytes(b"echo hello");
        let b = ContentDigest::from_bytes(b"echo hello");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn digest_rejects_non_hex() {
        let err = ContentDigest::try_from("not-a-digest".to_string()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDigest { .. }));
    }

    #[test]
    fn digest_accepts_uppercase_and_normalizes() {
        let upper = ContentDigest::from_bytes(b"x").as_str().to_ascii_uppercase();
        let parsed = ContentDigest::try_from(upper).unwrap();
        assert_eq!(parsed, ContentDigest::from_bytes(b"x"));
    }

    #[test]
    fn entry_at_overrides_date() {
        let when = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = LedgerEntry::new("001.delivery", true, ContentDigest::from_bytes(b"")).at(when);
        assert_eq!(entry.execution_date, when);
        assert!(entry.signed_for);
    }
}
