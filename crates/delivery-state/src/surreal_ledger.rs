//! SurrealDB-backed DeliveryLedger implementation
//!
//! The connection is opened lazily on first use. A store that cannot be
//! reached yet therefore surfaces as `StorageError::Unavailable` from the
//! first ledger call instead of failing construction, and later calls retry
//! the connection.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::migrations::{self, CLAIMS_TABLE, DELIVERIES_TABLE};
use crate::schema::{ClaimRow, LedgerRow};
use crate::storage_traits::{DeliveryLedger, LedgerEntry, StorageResult};

/// SurrealDB-backed implementation of [`DeliveryLedger`].
pub struct SurrealDeliveryLedger {
    config: StoreConfig,
    db: OnceCell<Surreal<Any>>,
}

impl SurrealDeliveryLedger {
    /// Ledger for the given store; no connection is made yet.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Ledger backed by an ephemeral `mem://` store.
    pub fn in_memory() -> Self {
        Self::new(StoreConfig::memory())
    }

    /// Ledger configured from `DELIVERY_DB_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // -- private helpers -----------------------------------------------------

    async fn db(&self) -> StorageResult<&Surreal<Any>> {
        self.db
            .get_or_try_init(|| async {
                let db = self.config.connect().await?;
                info!("SurrealDeliveryLedger connected ({})", self.config.endpoint);
                Ok::<_, StorageError>(db)
            })
            .await
    }

    async fn select_rows(
        &self,
        sql: &'static str,
        name: Option<String>,
    ) -> StorageResult<Vec<LedgerRow>> {
        let db = self.db().await?;
        let query = db.query(sql);
        let query = match name {
            Some(name) => query.bind(("name", name)),
            None => query,
        };
        let mut res = query
            .await
            .map_err(StorageError::from)?;

        res.take(0)
            .map_err(StorageError::from)
    }
}

/// SurrealDB reports unique index violations as "...already contains...".
fn is_unique_violation(err: &surrealdb::Error) -> bool {
    err.to_string().contains("already contains")
}

#[async_trait]
impl DeliveryLedger for SurrealDeliveryLedger {
    async fn exists(&self) -> StorageResult<bool> {
        let db = self.db().await?;
        migrations::ledger_table_exists(db).await
    }

    async fn create(&self) -> StorageResult<()> {
        let db = self.db().await?;
        migrations::init_schema(db).await
    }

    async fn find_by_name(&self, name: &str) -> StorageResult<Option<LedgerEntry>> {
        let rows = self
            .select_rows(
                "SELECT * FROM deliveries WHERE name = $name ORDER BY execution_date DESC LIMIT 1",
                Some(name.to_string()),
            )
            .await?;

        rows.into_iter().next().map(LedgerRow::into_entry).transpose()
    }

    async fn save(&self, entry: &LedgerEntry) -> StorageResult<()> {
        debug!(name = %entry.name, signed_for = entry.signed_for, "saving ledger entry");

        let db = self.db().await?;
        let _created: Option<LedgerRow> = db
            .create(DELIVERIES_TABLE)
            .content(LedgerRow::from(entry))
            .await
            .map_err(StorageError::from)?;

        Ok(())
    }

    async fn fetch_all(&self) -> StorageResult<Vec<LedgerEntry>> {
        let rows = self
            .select_rows("SELECT * FROM deliveries ORDER BY execution_date ASC", None)
            .await?;

        rows.into_iter().map(LedgerRow::into_entry).collect()
    }

    async fn claim(&self, name: &str, owner: &str) -> StorageResult<bool> {
        let db = self.db().await?;

        // Take over a claim whose holder never released it within the lease.
        let lease = format!("{}ms", self.config.claim_lease.as_millis());
        let stale: Vec<ClaimRow> = db
            .query(
                "DELETE delivery_claims WHERE name = $name \
                 AND claimed_at < time::now() - <duration> $lease RETURN BEFORE",
            )
            .bind(("name", name.to_string()))
            .bind(("lease", lease))
            .await
            .and_then(|mut r| r.take(0))
            .map_err(StorageError::from)?;
        for row in &stale {
            warn!(name, previous = %row.owner, claimed_at = %row.claimed_at, "taking over stale claim");
        }

        let created: Result<Option<ClaimRow>, _> = db
            .create(CLAIMS_TABLE)
            .content(ClaimRow::new(name, owner))
            .await;

        match created {
            Ok(_) => {
                debug!(name, owner, "claim acquired");
                Ok(true)
            }
            Err(e) if is_unique_violation(&e) => {
                debug!(name, owner, "claim held by another session");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn release(&self, name: &str, owner: &str) -> StorageResult<()> {
        let db = self.db().await?;
        db.query("DELETE delivery_claims WHERE name = $name AND owner = $owner")
            .bind(("name", name.to_string()))
            .bind(("owner", owner.to_string()))
            .await
            .and_then(|r| r.check())
            .map_err(StorageError::from)?;

        debug!(name, owner, "claim released");
        Ok(())
    }

    async fn force_release(&self, name: &str) -> StorageResult<bool> {
        let db = self.db().await?;
        let removed: Vec<ClaimRow> = db
            .query("DELETE delivery_claims WHERE name = $name RETURN BEFORE")
            .bind(("name", name.to_string()))
            .await
            .and_then(|mut r| r.take(0))
            .map_err(StorageError::from)?;

        for row in &removed {
            info!(name, owner = %row.owner, "claim forcibly released");
        }
        Ok(!removed.is_empty())
    }
}
