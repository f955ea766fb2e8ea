//! Delivery-State: execution ledger for delivery scripts
//!
//! This crate records which delivery scripts have run, whether they were
//! signed for, when, and the digest of their content. It handles all I/O
//! with SurrealDB behind the backend-agnostic [`DeliveryLedger`] trait.
//!
//! ## Key Components
//!
//! - `DeliveryLedger`: probe/provision/lookup/append/list plus advisory claims
//! - `SurrealDeliveryLedger`: lazily connected SurrealDB implementation
//! - `StoreConfig`: endpoint, credentials, namespace and database selection
//! - `fakes::MemoryDeliveryLedger`: in-memory implementation for tests

pub mod config;
mod error;
pub mod fakes;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_ledger;

pub use config::{Credentials, StoreConfig};
pub use error::StorageError;
pub use schema::{ClaimRow, LedgerRow};
pub use storage_traits::{
    ContentDigest, DeliveryLedger, LedgerEntry, StorageResult, DEFAULT_CLAIM_LEASE,
};
pub use surreal_ledger::SurrealDeliveryLedger;
