//! In-memory fake for the ledger trait (testing only)
//!
//! `MemoryDeliveryLedger` satisfies the `DeliveryLedger` contract without any
//! external dependencies, and can simulate the store states the delivery
//! engine has to recover from: absent table, unreachable store, failed
//! provisioning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct LedgerState {
    provisioned: bool,
    /// Store stays unreachable for this many more `create()` attempts.
    unavailable_for: Option<usize>,
    fail_create: bool,
    entries: Vec<LedgerEntry>,
    /// name -> (owner, claimed at)
    claims: HashMap<String, (String, DateTime<Utc>)>,
    claim_lease: Option<Duration>,
}

/// In-memory delivery ledger backed by a `Vec<LedgerEntry>`.
#[derive(Debug, Default)]
pub struct MemoryDeliveryLedger {
    state: Mutex<LedgerState>,
    lookups: AtomicUsize,
    create_calls: AtomicUsize,
}

impl MemoryDeliveryLedger {
    /// A reachable store whose ledger table has not been created yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A reachable store with the ledger table already present.
    pub fn provisioned() -> Self {
        let ledger = Self::default();
        ledger.state.lock().unwrap().provisioned = true;
        ledger
    }

    /// A store that is unreachable until one `create()` attempt has been made
    /// (i.e. until something else provisions it).
    pub fn unavailable() -> Self {
        Self::unavailable_for(1)
    }

    /// A store that stays unreachable for `attempts` calls to `create()`.
    pub fn unavailable_for(attempts: usize) -> Self {
        let ledger = Self::default();
        ledger.state.lock().unwrap().unavailable_for = Some(attempts);
        ledger
    }

    /// Make every `create()` fail with a backend error.
    pub fn failing_create(self) -> Self {
        self.state.lock().unwrap().fail_create = true;
        self
    }

    /// Override the claim lease (default: `DEFAULT_CLAIM_LEASE`).
    pub fn with_claim_lease(self, lease: Duration) -> Self {
        self.state.lock().unwrap().claim_lease = Some(lease);
        self
    }

    /// Seed an entry (the table is marked as provisioned).
    pub fn with_entry(self, entry: LedgerEntry) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.provisioned = true;
            state.entries.push(entry);
        }
        self
    }

    /// Whether the ledger table has been created.
    pub fn is_provisioned(&self) -> bool {
        self.state.lock().unwrap().provisioned
    }

    /// Snapshot of every stored entry, in insertion order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.state.lock().unwrap().entries.clone()
    }

    /// Number of `find_by_name` calls made so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of `create` calls made so far.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Names currently claimed, with their owners.
    pub fn claims(&self) -> HashMap<String, String> {
        self.state
            .lock()
            .unwrap()
            .claims
            .iter()
            .map(|(name, (owner, _))| (name.clone(), owner.clone()))
            .collect()
    }

    /// Pretend another session holds a claim on `name`, taken just now.
    pub fn hold_claim(&self, name: &str, owner: &str) {
        self.hold_claim_since(name, owner, Utc::now());
    }

    /// Pretend another session claimed `name` at `claimed_at` and never
    /// released it.
    pub fn hold_claim_since(&self, name: &str, owner: &str, claimed_at: DateTime<Utc>) {
        self.state
            .lock()
            .unwrap()
            .claims
            .insert(name.to_string(), (owner.to_string(), claimed_at));
    }

    fn ready(state: &LedgerState) -> StorageResult<()> {
        if state.unavailable_for.is_some() {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        if !state.provisioned {
            return Err(StorageError::Backend("table deliveries does not exist".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryLedger for MemoryDeliveryLedger {
    async fn exists(&self) -> StorageResult<bool> {
        let state = self.state.lock().unwrap();
        if state.unavailable_for.is_some() {
            return Err(StorageError::Unavailable("memory store offline".into()));
        }
        Ok(state.provisioned)
    }

    async fn create(&self) -> StorageResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();

        if let Some(remaining) = state.unavailable_for {
            if remaining > 1 {
                state.unavailable_for = Some(remaining - 1);
                return Err(StorageError::Unavailable("memory store offline".into()));
            }
            state.unavailable_for = None;
        }
        if state.fail_create {
            return Err(StorageError::Backend("create refused".into()));
        }
        state.provisioned = true;
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<LedgerEntry>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Self::ready(&state)?;

        // max_by_key keeps the last maximum, so equal dates resolve to the
        // most recently inserted entry.
        Ok(state
            .entries
            .iter()
            .filter(|e| e.name == name)
            .max_by_key(|e| e.execution_date)
            .cloned())
    }

    async fn save(&self, entry: &LedgerEntry) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::ready(&state)?;
        state.entries.push(entry.clone());
        Ok(())
    }

    async fn fetch_all(&self) -> StorageResult<Vec<LedgerEntry>> {
        let state = self.state.lock().unwrap();
        Self::ready(&state)?;
        let mut entries = state.entries.clone();
        entries.sort_by_key(|e| e.execution_date);
        Ok(entries)
    }

    async fn claim(&self, name: &str, owner: &str) -> StorageResult<bool> {
        let mut state = self.state.lock().unwrap();
        Self::ready(&state)?;
        let lease = state.claim_lease.unwrap_or(DEFAULT_CLAIM_LEASE);
        if let Some((holder, claimed_at)) = state.claims.get(name) {
            let expired = (Utc::now() - *claimed_at)
                .to_std()
                .map(|age| age > lease)
                .unwrap_or(false);
            if !expired {
                return Ok(false);
            }
            tracing::warn!(name, previous = %holder, "taking over stale claim");
        }
        state
            .claims
            .insert(name.to_string(), (owner.to_string(), Utc::now()));
        Ok(true)
    }

    async fn release(&self, name: &str, owner: &str) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::ready(&state)?;
        if state.claims.get(name).map(|(holder, _)| holder.as_str()) == Some(owner) {
            state.claims.remove(name);
        }
        Ok(())
    }

    async fn force_release(&self, name: &str) -> StorageResult<bool> {
        let mut state = self.state.lock().unwrap();
        Self::ready(&state)?;
        Ok(state.claims.remove(name).is_some())
    }
}
