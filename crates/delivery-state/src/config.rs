//! Connection settings for the ledger store.
//!
//! Supports local embedded stores (`surrealkv://`, `mem://`) and remote
//! WebSocket endpoints with root or database-user credentials.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use std::time::Duration;

use surrealdb::Surreal;
use tracing::{info, warn};

use crate::storage_traits::{StorageResult, DEFAULT_CLAIM_LEASE};
use crate::StorageError;

/// Default endpoint when nothing is configured.
pub const DEFAULT_ENDPOINT: &str = "surrealkv://.delivery/db";

/// Credentials for a remote store
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

/// Configuration for the ledger store connection
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint URL (e.g. "mem://", "surrealkv://path", "wss://host")
    pub endpoint: String,
    /// Optional sign-in credentials
    pub credentials: Option<Credentials>,
    /// Namespace (default: "delivery")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Age after which an unreleased claim may be taken over
    pub claim_lease: Duration,
}

impl StoreConfig {
    /// Configuration for the given endpoint with default namespace/database.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: None,
            namespace: "delivery".to_string(),
            database: "main".to_string(),
            claim_lease: DEFAULT_CLAIM_LEASE,
        }
    }

    /// Ephemeral in-process store.
    pub fn memory() -> Self {
        Self::new("mem://")
    }

    /// Sign in as a database user
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
            is_root: false,
        });
        self
    }

    /// Sign in as a root user
    pub fn with_root(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
            is_root: true,
        });
        self
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set the claim lease
    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - DELIVERY_DB_URL (optional, default: `surrealkv://.delivery/db`)
    /// - DELIVERY_DB_USERNAME / DELIVERY_DB_PASSWORD (optional, both or neither)
    /// - DELIVERY_DB_NAMESPACE (optional, default: "delivery")
    /// - DELIVERY_DB_DATABASE (optional, default: "main")
    /// - DELIVERY_DB_ROOT (optional, default: "false") - "true" for root users
    /// - DELIVERY_CLAIM_LEASE_SECS (optional, default: 3600)
    pub fn from_env() -> Self {
        let endpoint =
            std::env::var("DELIVERY_DB_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        let mut config = Self::new(endpoint);

        if let Ok(ns) = std::env::var("DELIVERY_DB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Ok(db) = std::env::var("DELIVERY_DB_DATABASE") {
            config.database = db;
        }
        if let Ok(secs) = std::env::var("DELIVERY_CLAIM_LEASE_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) => config.claim_lease = Duration::from_secs(secs),
                Err(_) => warn!(value = %secs, "ignoring invalid DELIVERY_CLAIM_LEASE_SECS"),
            }
        }

        if let (Ok(username), Ok(password)) = (
            std::env::var("DELIVERY_DB_USERNAME"),
            std::env::var("DELIVERY_DB_PASSWORD"),
        ) {
            let is_root = std::env::var("DELIVERY_DB_ROOT")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false);
            config = if is_root {
                config.with_root(username, password)
            } else {
                config.with_user(username, password)
            };
        }

        config
    }

    /// Open a connection, sign in and select namespace/database.
    ///
    /// Every failure here maps to `StorageError::Unavailable`: the store is
    /// not reachable or not provisioned yet.
    pub async fn connect(&self) -> StorageResult<Surreal<Any>> {
        if let Some(path) = self.endpoint.strip_prefix("surrealkv://") {
            std::fs::create_dir_all(path).map_err(|e| {
                StorageError::Unavailable(format!(
                    "failed to create database directory {}: {}",
                    path, e
                ))
            })?;
        }

        let db = surrealdb::engine::any::connect(&self.endpoint)
            .await
            .map_err(|e| {
                StorageError::Unavailable(format!("failed to connect to {}: {}", self.endpoint, e))
            })?;

        if let Some(creds) = &self.credentials {
            if creds.is_root {
                db.signin(Root {
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StorageError::Unavailable(format!("root auth failed: {e}")))?;
            } else {
                db.signin(Database {
                    namespace: &self.namespace,
                    database: &self.database,
                    username: &creds.username,
                    password: &creds.password,
                })
                .await
                .map_err(|e| StorageError::Unavailable(format!("db auth failed: {e}")))?;
            }
        }

        db.use_ns(&self.namespace)
            .use_db(&self.database)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        info!(endpoint = %self.endpoint, "ledger store connected");
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let cfg = StoreConfig::new("ws://localhost:8000")
            .with_namespace("ops")
            .with_database("site")
            .with_root("root", "secret");

        assert_eq!(cfg.namespace, "ops");
        assert_eq!(cfg.database, "site");
        let creds = cfg.credentials.unwrap();
        assert!(creds.is_root);
        assert_eq!(creds.username, "root");
    }

    #[test]
    fn memory_uses_defaults() {
        let cfg = StoreConfig::memory();
        assert_eq!(cfg.endpoint, "mem://");
        assert_eq!(cfg.namespace, "delivery");
        assert_eq!(cfg.database, "main");
        assert!(cfg.credentials.is_none());
        assert_eq!(cfg.claim_lease, DEFAULT_CLAIM_LEASE);
    }

    #[test]
    fn claim_lease_is_configurable() {
        let cfg = StoreConfig::memory().with_claim_lease(Duration::from_secs(90));
        assert_eq!(cfg.claim_lease, Duration::from_secs(90));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let err = StoreConfig::new("bogus-scheme://nowhere")
            .connect()
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
