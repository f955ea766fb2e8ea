//! Row definitions for the delivery SurrealDB tables
//!
//! Tables:
//! - deliveries: one row per script execution attempt
//! - delivery_claims: advisory claims on script names (unique by name)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{ContentDigest, LedgerEntry, StorageResult};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Ledger row - one execution attempt of one script
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    /// Script file name
    pub name: String,
    /// Execution timestamp
    #[serde(with = "surreal_datetime")]
    pub execution_date: DateTime<Utc>,
    /// Whether every instruction continued
    pub signed_for: bool,
    /// SHA-256 hex of the script bytes
    pub hash: String,
}

impl From<&LedgerEntry> for LedgerRow {
    fn from(entry: &LedgerEntry) -> Self {
        LedgerRow {
            id: None,
            name: entry.name.clone(),
            execution_date: entry.execution_date,
            signed_for: entry.signed_for,
            hash: entry.hash.as_str().to_string(),
        }
    }
}

impl LedgerRow {
    /// Convert the DB row into a domain entry, validating the stored hash.
    pub fn into_entry(self) -> StorageResult<LedgerEntry> {
        Ok(LedgerEntry {
            name: self.name,
            execution_date: self.execution_date,
            signed_for: self.signed_for,
            hash: ContentDigest::try_from(self.hash)?,
        })
    }
}

/// Claim row - marks a script name as being delivered by one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub name: String,
    pub owner: String,
    #[serde(with = "surreal_datetime")]
    pub claimed_at: DateTime<Utc>,
}

impl ClaimRow {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        ClaimRow {
            id: None,
            name: name.into(),
            owner: owner.into(),
            claimed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trips_entry_fields() {
        let entry = LedgerEntry::new("001.delivery", true, ContentDigest::from_bytes(b"abc"));
        let row = LedgerRow::from(&entry);
        assert_eq!(row.hash, entry.hash.as_str());

        let back = row.into_entry().unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn row_with_corrupt_hash_is_rejected() {
        let mut row = LedgerRow::from(&LedgerEntry::new(
            "002.delivery",
            false,
            ContentDigest::from_bytes(b"abc"),
        ));
        row.hash = "zz".to_string();
        assert!(row.into_entry().is_err());
    }

    #[test]
    fn claim_row_serializes_without_id() {
        let json = serde_json::to_string(&ClaimRow::new("001.delivery", "session-a")).unwrap();
        assert!(json.contains("session-a"));
        assert!(!json.contains("\"id\""));
    }
}
