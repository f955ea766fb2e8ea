//! SurrealDB schema provisioning and probing for the delivery ledger
//!
//! `init_schema` is what the ledger's `create()` runs; `ledger_table_exists`
//! is what `exists()` runs.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::storage_traits::StorageResult;
use crate::StorageError;

/// Name of the ledger table.
pub const DELIVERIES_TABLE: &str = "deliveries";

/// Name of the advisory claims table.
pub const CLAIMS_TABLE: &str = "delivery_claims";

/// Define the ledger and claims tables.
///
/// The statements use `IF NOT EXISTS`, so a database whose tables were
/// already defined by a provisioning script is left as is.
pub async fn init_schema(db: &Surreal<Any>) -> StorageResult<()> {
    info!("Provisioning delivery ledger schema");

    init_deliveries_table(db).await?;
    init_claims_table(db).await?;

    info!("Delivery ledger schema ready");
    Ok(())
}

/// Whether the `deliveries` table is defined in the selected database.
pub async fn ledger_table_exists(db: &Surreal<Any>) -> StorageResult<bool> {
    let mut res = db
        .query("INFO FOR DB")
        .await
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;

    let info: Option<serde_json::Value> = res
        .take(0)
        .map_err(StorageError::from)?;

    let present = info
        .as_ref()
        .and_then(|v| v.get("tables"))
        .and_then(|t| t.get(DELIVERIES_TABLE))
        .is_some();

    debug!(present, "probed ledger table");
    Ok(present)
}

/// Initialize `deliveries` table
///
/// Schema:
/// ```text
/// TABLE deliveries {
///   name:            STRING (indexed, not unique: one row per attempt)
///   execution_date:  DATETIME
///   signed_for:      BOOL
///   hash:            STRING (SHA-256 hex)
/// }
/// ```
///
/// Rows are append-only; the latest row per name decides skip-on-rerun.
async fn init_deliveries_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing deliveries table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS deliveries
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_delivery_name ON TABLE deliveries COLUMNS name;

        -- Latest-attempt lookup
        DEFINE INDEX IF NOT EXISTS idx_delivery_name_date ON TABLE deliveries COLUMNS name, execution_date;
    "#;

    db.query(sql)
        .await
        .and_then(|r| r.check())
        .map_err(StorageError::from)?;
    info!("✓ deliveries table initialized");
    Ok(())
}

/// Initialize `delivery_claims` table
///
/// Schema:
/// ```text
/// TABLE delivery_claims {
///   name:        STRING (unique)
///   owner:       STRING (session id)
///   claimed_at:  DATETIME
/// }
/// ```
///
/// The unique index on `name` is what makes a claim exclusive across
/// concurrently running engines.
async fn init_claims_table(db: &Surreal<Any>) -> StorageResult<()> {
    debug!("Initializing delivery_claims table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS delivery_claims
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete FULL;

        DEFINE INDEX IF NOT EXISTS idx_claim_name ON TABLE delivery_claims COLUMNS name UNIQUE;
    "#;

    db.query(sql)
        .await
        .and_then(|r| r.check())
        .map_err(StorageError::from)?;
    info!("✓ delivery_claims table initialized");
    Ok(())
}
