//! Tracking reporter output over the in-memory ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use delivery_core::{
    BufferedOutput, ContentDigest, ExecutionOutcome, LedgerEntry, ScriptStore, TrackingReporter,
};
use delivery_state::fakes::MemoryDeliveryLedger;

fn at(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
}

fn entry(name: &str, signed_for: bool, ts: &str) -> LedgerEntry {
    LedgerEntry::new(name, signed_for, ContentDigest::from_bytes(name.as_bytes())).at(at(ts))
}

fn seeded() -> MemoryDeliveryLedger {
    MemoryDeliveryLedger::new()
        .with_entry(entry("001.delivery", true, "2024-05-01T10:00:00Z"))
        .with_entry(entry("002.delivery", false, "2024-05-01T10:05:00Z"))
        .with_entry(entry("002.delivery", true, "2024-05-02T09:00:00Z"))
}

fn reporter(ledger: MemoryDeliveryLedger) -> (TrackingReporter, Arc<BufferedOutput>) {
    let out = Arc::new(BufferedOutput::new());
    (TrackingReporter::new(Arc::new(ledger), out.clone()), out)
}

#[tokio::test]
async fn signed_for_lists_only_signed_entries() {
    let (r, out) = reporter(seeded());

    assert_eq!(r.signed_for().await, ExecutionOutcome::Continue);
    let lines = out.captured();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Name"));
    assert!(lines[0].contains("Signed for"));
    assert!(lines[1].starts_with("001.delivery"));
    assert!(lines[1].contains("2024-05-01 10:00:00"));
    assert!(lines[2].contains("2024-05-02 09:00:00"));
}

#[tokio::test]
async fn columns_are_aligned() {
    let (r, out) = reporter(seeded());

    r.history().await;
    let lines = out.captured();
    let col = lines[0].find("Executed").unwrap();
    for line in &lines[1..] {
        assert_eq!(&line[col..col + 4], "2024");
    }
}

#[tokio::test]
async fn history_lists_every_attempt() {
    let (r, out) = reporter(seeded());

    assert_eq!(r.history().await, ExecutionOutcome::Continue);
    assert_eq!(out.captured().len(), 4);
}

#[tokio::test]
async fn status_shows_latest_attempt_and_unattempted_names() {
    let (r, out) = reporter(seeded());
    let names = vec!["002.delivery".to_string(), "003.delivery".to_string()];

    assert_eq!(r.status(&names).await, ExecutionOutcome::Continue);
    let lines = out.captured();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].contains("2024-05-02 09:00:00"));
    assert!(lines[1].contains("yes"));
    assert!(lines[2].starts_with("003.delivery"));
    assert!(lines[2].contains("not attempted"));
}

#[tokio::test]
async fn available_diffs_directory_against_ledger() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["001.delivery", "002.delivery", "003.delivery", "004.delivery"] {
        std::fs::write(dir.path().join(name), "echo").unwrap();
    }
    let (r, out) = reporter(seeded());

    let outcome = r.available(&ScriptStore::new(dir.path())).await;
    assert_eq!(outcome, ExecutionOutcome::Continue);
    let lines = out.captured();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("003.delivery"));
    assert!(lines[2].starts_with("004.delivery"));
}

#[tokio::test]
async fn available_with_everything_attempted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("001.delivery"), "echo").unwrap();
    let (r, out) = reporter(seeded());

    r.available(&ScriptStore::new(dir.path())).await;
    assert!(out.contains("has been attempted"));
}

#[tokio::test]
async fn uncreated_ledger_is_a_notice_not_a_failure() {
    let (r, out) = reporter(MemoryDeliveryLedger::new());

    assert_eq!(r.signed_for().await, ExecutionOutcome::Continue);
    assert!(out.contains("has not been created yet"));
}

#[tokio::test]
async fn unreachable_ledger_is_reported() {
    let (r, out) = reporter(MemoryDeliveryLedger::unavailable());

    assert_eq!(r.history().await, ExecutionOutcome::FinishedWithError);
    assert!(out.contains("Could not reach the delivery ledger"));
}

#[tokio::test]
async fn unreadable_directory_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let (r, out) = reporter(seeded());

    let outcome = r.available(&ScriptStore::new(dir.path().join("missing"))).await;
    assert_eq!(outcome, ExecutionOutcome::FinishedWithError);
    assert!(out.contains("cannot access delivery directory"));
}
