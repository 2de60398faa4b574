//! Persistence: a key-value blob store abstraction and the record store.
//!
//! All durable state lives in four independent blobs, each wrapped in a
//! `{version, timestamp, data}` envelope: the main dataset plus one blob per
//! lookup table. The blob store has a size ceiling and may refuse writes
//! with a quota error; the record store must survive that without failing
//! the caller (reduced projection, then retention cleanup and one retry).

use std::collections::HashSet;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::{Record, STORAGE_VERSION};

/// Blob keys, one per persisted table.
pub const DATA_KEY: &str = "gaming_analytics_data";
pub const REGISTRY_KEY: &str = "gaming_analytics_anagrafica";
pub const ALIAS_KEY: &str = "gaming_analytics_nomi_giochi";
pub const SECTOR_KEY: &str = "gaming_analytics_comparti";

/// Serialized-size ceiling above which the reduced projection is persisted.
pub const MAX_BLOB_BYTES: usize = 50 * 1024 * 1024;

/// Default retention window for `retention_cleanup`.
pub const DEFAULT_RETENTION_MONTHS: u32 = 12;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded: {size} bytes against a {limit} byte limit")]
    QuotaExceeded { size: usize, limit: usize },
    #[error("storage I/O error")]
    Io(#[from] std::io::Error),
}

/// Generic key-value blob store. Implementations own durability; callers
/// own serialization.
pub trait BlobStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

// =============================================================================
// BLOB STORE IMPLEMENTATIONS
// =============================================================================

/// Directory-backed blob store: one JSON file per key, written atomically
/// (temp file + rename) so a crash mid-write never corrupts a blob.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)
            .with_context(|| format!("creating storage directory {}", root.display()))?;
        Ok(DirStore { root: root.to_path_buf() })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl BlobStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = self.root.join(format!("{key}.json.tmp"));
        let mut file = fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory blob store with an optional total-size quota, mirroring the
/// behavior of a browser's local storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: std::collections::HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        MemoryStore {
            blobs: Default::default(),
            quota: Some(quota),
        }
    }

    fn total_bytes(&self) -> usize {
        self.blobs.values().map(|v| v.len()).sum()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if let Some(limit) = self.quota {
            let existing = self.blobs.get(key).map(|v| v.len()).unwrap_or(0);
            let size = self.total_bytes() - existing + value.len();
            if size > limit {
                return Err(StoreError::QuotaExceeded { size, limit });
            }
        }
        self.blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.blobs.remove(key);
        Ok(())
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// Every persisted blob is wrapped in this envelope. A version mismatch on
/// load triggers a transparent migrate-and-resave, never data loss.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: String,
    pub timestamp: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T, now: DateTime<Utc>) -> Self {
        Envelope {
            version: STORAGE_VERSION.to_string(),
            timestamp: now.to_rfc3339(),
            data,
        }
    }
}

/// Persist a lookup table (or any payload) under its blob key.
pub fn persist_table<T: Serialize>(
    blob: &mut dyn BlobStore,
    key: &str,
    data: &T,
    now: DateTime<Utc>,
) -> Result<()> {
    let envelope = Envelope::new(data, now);
    let serialized = serde_json::to_string(&envelope).context("serializing blob envelope")?;
    blob.set(key, &serialized)
        .with_context(|| format!("writing blob '{key}'"))?;
    Ok(())
}

/// Load a lookup table; `None` when the blob has never been written.
pub fn load_table<T: DeserializeOwned>(
    blob: &dyn BlobStore,
    key: &str,
) -> Result<Option<Envelope<T>>> {
    let Some(serialized) = blob.get(key).with_context(|| format!("reading blob '{key}'"))? else {
        return Ok(None);
    };
    let envelope =
        serde_json::from_str(&serialized).with_context(|| format!("decoding blob '{key}'"))?;
    Ok(Some(envelope))
}

// =============================================================================
// RECORD STORE
// =============================================================================

/// Outcome of a persist attempt. Quota pressure degrades the write (reduced
/// projection, retention cleanup) instead of failing it; `warning` carries
/// anything the user should see.
#[derive(Debug, Default)]
pub struct PersistReport {
    pub saved: bool,
    pub reduced: bool,
    pub removed_by_cleanup: usize,
    pub warning: Option<String>,
}

#[derive(Debug)]
pub struct LoadReport {
    pub loaded: usize,
    /// True when the blob was written by a different schema version; the
    /// caller should re-persist immediately to complete the migration.
    pub migrated: bool,
}

/// The accumulated dataset plus its persistence logic.
#[derive(Debug)]
pub struct RecordStore {
    records: Vec<Record>,
    /// Serialized-size ceiling; above it the reduced projection is written.
    max_blob_bytes: usize,
}

impl Default for RecordStore {
    fn default() -> Self {
        RecordStore {
            records: Vec::new(),
            max_blob_bytes: MAX_BLOB_BYTES,
        }
    }
}

impl RecordStore {
    pub fn new() -> Self {
        RecordStore::default()
    }

    /// Store with a non-default size ceiling.
    pub fn with_size_ceiling(max_blob_bytes: usize) -> Self {
        RecordStore {
            records: Vec::new(),
            max_blob_bytes,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge a freshly parsed batch, dropping records whose identity key is
    /// already present. Returns (added, duplicates dropped). Duplicates are
    /// dropped, not upserted: re-importing a corrected file under the same
    /// name does not replace prior rows.
    pub fn append(&mut self, batch: Vec<Record>) -> (usize, usize) {
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.dedup_key()).collect();
        let before = self.records.len();
        let mut dropped = 0;
        for record in batch {
            if seen.insert(record.dedup_key()) {
                self.records.push(record);
            } else {
                dropped += 1;
            }
        }
        (self.records.len() - before, dropped)
    }

    /// Serialize and write the dataset. Never fails on quota pressure:
    /// above the size ceiling the reduced projection (display labels
    /// stripped) is written instead; a quota error from the blob store
    /// triggers retention cleanup and one retry.
    pub fn persist(&mut self, blob: &mut dyn BlobStore, now: DateTime<Utc>) -> Result<PersistReport> {
        let mut report = PersistReport::default();

        let mut serialized = self.serialize_full(now)?;
        if serialized.len() > self.max_blob_bytes {
            serialized = self.serialize_reduced(now)?;
            report.reduced = true;
        }

        match blob.set(DATA_KEY, &serialized) {
            Ok(()) => {
                report.saved = true;
                return Ok(report);
            }
            Err(StoreError::QuotaExceeded { .. }) => {}
            Err(err) => return Err(err).context("writing dataset blob"),
        }

        // Quota hit: age out old records and retry once, reduced.
        report.removed_by_cleanup = self.retention_cleanup(DEFAULT_RETENTION_MONTHS, now);
        report.reduced = true;
        let retry = self.serialize_reduced(now)?;
        match blob.set(DATA_KEY, &retry) {
            Ok(()) => {
                report.saved = true;
                report.warning = Some(format!(
                    "storage quota exceeded: removed {} records older than {} months and saved a reduced dataset",
                    report.removed_by_cleanup, DEFAULT_RETENTION_MONTHS
                ));
            }
            Err(err) => {
                report.warning = Some(format!("dataset not persisted: {err}"));
            }
        }
        Ok(report)
    }

    fn serialize_full(&self, now: DateTime<Utc>) -> Result<String> {
        let envelope = Envelope::new(&self.records, now);
        serde_json::to_string(&envelope).context("serializing dataset")
    }

    fn serialize_reduced(&self, now: DateTime<Utc>) -> Result<String> {
        let reduced: Vec<Record> = self
            .records
            .iter()
            .map(|r| {
                let mut r = r.clone();
                r.strip_display_fields();
                r
            })
            .collect();
        let envelope = Envelope::new(&reduced, now);
        serde_json::to_string(&envelope).context("serializing reduced dataset")
    }

    /// Load the persisted dataset, backfilling fields missing from older
    /// schema versions and recomputing display labels.
    pub fn load(&mut self, blob: &dyn BlobStore) -> Result<LoadReport> {
        let Some(envelope) = load_table::<Vec<Record>>(blob, DATA_KEY)? else {
            return Ok(LoadReport { loaded: 0, migrated: false });
        };
        let migrated = envelope.version != STORAGE_VERSION;
        self.records = envelope.data;
        for record in &mut self.records {
            record.restore_display_fields();
        }
        Ok(LoadReport { loaded: self.records.len(), migrated })
    }

    /// Drop records whose (year, month) predates now minus `months`.
    /// Records with an unparseable period are kept. Returns count removed.
    pub fn retention_cleanup(&mut self, months: u32, now: DateTime<Utc>) -> usize {
        let cutoff = now.date_naive() - Months::new(months);
        let before = self.records.len();
        self.records.retain(|record| {
            let year: i32 = match record.year.parse() {
                Ok(y) => y,
                Err(_) => return true,
            };
            let month: u32 = match record.month.parse() {
                Ok(m) => m,
                Err(_) => return true,
            };
            match NaiveDate::from_ymd_opt(year, month, 1) {
                Some(date) => date >= cutoff,
                None => true,
            }
        });
        before - self.records.len()
    }

    /// Drop all records and the persisted blob.
    pub fn clear(&mut self, blob: &mut dyn BlobStore) -> Result<()> {
        self.records.clear();
        blob.remove(DATA_KEY).context("removing dataset blob")?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(file: &str, code: &str, month: &str, year: &str) -> Record {
        let mut r = Record {
            file_name: file.to_string(),
            codice_concessione: code.to_string(),
            month: month.to_string(),
            year: year.to_string(),
            month_year: format!("{month}/{year}"),
            ..Record::default()
        };
        r.restore_display_fields();
        r
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    // -------------------------------------------------------------------------
    // DEDUPLICATION
    // -------------------------------------------------------------------------

    #[test]
    fn append_drops_duplicate_keys() {
        let mut store = RecordStore::new();
        let (added, dropped) = store.append(vec![
            record("a.xlsx", "123", "01", "2024"),
            record("a.xlsx", "456", "01", "2024"),
        ]);
        assert_eq!((added, dropped), (2, 0));

        // Re-importing the same file is a no-op.
        let (added, dropped) = store.append(vec![
            record("a.xlsx", "123", "01", "2024"),
            record("a.xlsx", "789", "01", "2024"),
        ]);
        assert_eq!((added, dropped), (1, 1));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn same_dealer_and_period_from_different_files_are_both_kept() {
        let mut store = RecordStore::new();
        store.append(vec![record("gennaio.xlsx", "123", "01", "2024")]);
        let (added, dropped) = store.append(vec![record("gennaio-v2.xlsx", "123", "01", "2024")]);
        assert_eq!((added, dropped), (1, 0));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn append_deduplicates_within_one_batch() {
        let mut store = RecordStore::new();
        let (added, dropped) = store.append(vec![
            record("a.xlsx", "123", "01", "2024"),
            record("a.xlsx", "123", "01", "2024"),
        ]);
        assert_eq!((added, dropped), (1, 1));
    }

    // -------------------------------------------------------------------------
    // PERSIST / LOAD
    // -------------------------------------------------------------------------

    #[test]
    fn persist_and_load_roundtrip() {
        let mut blob = MemoryStore::new();
        let mut store = RecordStore::new();
        store.append(vec![record("a.xlsx", "123", "01", "2024")]);

        let report = store.persist(&mut blob, now()).unwrap();
        assert!(report.saved);
        assert!(!report.reduced);
        assert!(report.warning.is_none());

        let mut loaded = RecordStore::new();
        let load = loaded.load(&blob).unwrap();
        assert_eq!(load.loaded, 1);
        assert!(!load.migrated);
        assert_eq!(loaded.records(), store.records());
    }

    #[test]
    fn load_without_blob_is_empty() {
        let blob = MemoryStore::new();
        let mut store = RecordStore::new();
        let report = store.load(&blob).unwrap();
        assert_eq!(report.loaded, 0);
        assert!(!report.migrated);
    }

    #[test]
    fn version_mismatch_flags_migration_and_restores_labels() {
        let mut blob = MemoryStore::new();
        let json = r#"{"version":"2.0","timestamp":"2023-01-01T00:00:00Z","data":[{"fileName":"old.xlsx","gameName":"Lotto","month":"05","year":"2021","monthYear":"05/2021"}]}"#;
        blob.set(DATA_KEY, json).unwrap();

        let mut store = RecordStore::new();
        let report = store.load(&blob).unwrap();
        assert_eq!(report.loaded, 1);
        assert!(report.migrated);
        assert_eq!(store.records()[0].month_name, "Maggio");
        assert_eq!(store.records()[0].canale, "fisico");
    }

    #[test]
    fn quota_error_triggers_cleanup_and_retry() {
        // Quota sized so the full dataset does not fit but the post-cleanup
        // dataset does.
        let mut store = RecordStore::new();
        let mut batch = Vec::new();
        for i in 0..50 {
            batch.push(record("old.xlsx", &format!("{i}"), "01", "2020"));
        }
        batch.push(record("new.xlsx", "999", "05", "2025"));
        store.append(batch);

        let full_size = serde_json::to_string(&Envelope::new(store.records(), now()))
            .unwrap()
            .len();
        let mut blob = MemoryStore::with_quota(full_size / 2);

        let report = store.persist(&mut blob, now()).unwrap();
        assert!(report.saved);
        assert!(report.reduced);
        assert_eq!(report.removed_by_cleanup, 50);
        assert!(report.warning.is_some());
        assert_eq!(store.len(), 1);

        let mut loaded = RecordStore::new();
        loaded.load(&blob).unwrap();
        assert_eq!(loaded.len(), 1);
        // Display labels were stripped on write and restored on load.
        assert_eq!(loaded.records()[0].month_name, "Maggio");
    }

    #[test]
    fn oversize_dataset_is_written_as_the_reduced_projection() {
        // A ceiling smaller than one serialized record: the full projection
        // is over it, so the reduced one is written, with no cleanup.
        let mut store = RecordStore::with_size_ceiling(200);
        store.append(vec![record("a.xlsx", "123", "05", "2025")]);

        let mut blob = MemoryStore::new();
        let report = store.persist(&mut blob, now()).unwrap();
        assert!(report.saved);
        assert!(report.reduced);
        assert_eq!(report.removed_by_cleanup, 0);
        assert!(report.warning.is_none());
        assert_eq!(store.len(), 1);

        // The blob carries stripped display labels; load recomputes them.
        let raw = blob.get(DATA_KEY).unwrap().unwrap();
        assert!(raw.contains(r#""monthName":"""#));
        let mut loaded = RecordStore::new();
        loaded.load(&blob).unwrap();
        assert_eq!(loaded.records()[0].month_name, "Maggio");
    }

    #[test]
    fn hopeless_quota_reports_warning_without_failing() {
        let mut store = RecordStore::new();
        store.append(vec![record("a.xlsx", "123", "05", "2025")]);
        let mut blob = MemoryStore::with_quota(10);

        let report = store.persist(&mut blob, now()).unwrap();
        assert!(!report.saved);
        assert!(report.warning.is_some());
    }

    // -------------------------------------------------------------------------
    // RETENTION CLEANUP
    // -------------------------------------------------------------------------

    #[test]
    fn retention_cleanup_drops_only_old_records() {
        let mut store = RecordStore::new();
        store.append(vec![
            record("a.xlsx", "1", "05", "2024"),
            record("a.xlsx", "2", "07", "2024"),
            record("a.xlsx", "3", "04", "2024"),
            record("a.xlsx", "4", "01", "2020"),
        ]);
        // now = 2025-06-15, cutoff = 2024-06-15: month buckets are dated on
        // the 1st, so July 2024 is the oldest surviving month.
        let removed = store.retention_cleanup(12, now());
        assert_eq!(removed, 3);
        assert_eq!(store.records()[0].codice_concessione, "2");
    }

    #[test]
    fn retention_cleanup_keeps_unparseable_periods() {
        let mut store = RecordStore::new();
        store.append(vec![record("a.xlsx", "1", "??", "????")]);
        assert_eq!(store.retention_cleanup(12, now()), 0);
        assert_eq!(store.len(), 1);
    }

    // -------------------------------------------------------------------------
    // BLOB STORES
    // -------------------------------------------------------------------------

    #[test]
    fn dir_store_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut blob = DirStore::open(dir.path()).unwrap();
        assert_eq!(blob.get(DATA_KEY).unwrap(), None);

        blob.set(DATA_KEY, "{\"x\":1}").unwrap();
        assert_eq!(blob.get(DATA_KEY).unwrap().as_deref(), Some("{\"x\":1}"));

        blob.remove(DATA_KEY).unwrap();
        assert_eq!(blob.get(DATA_KEY).unwrap(), None);
        // Removing a missing key is fine.
        blob.remove(DATA_KEY).unwrap();
    }

    #[test]
    fn memory_store_enforces_quota() {
        let mut blob = MemoryStore::with_quota(10);
        blob.set("a", "12345").unwrap();
        let err = blob.set("b", "1234567").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { size: 12, limit: 10 }));
        // Overwriting an existing key counts the replacement, not the sum.
        blob.set("a", "1234567890").unwrap();
    }

    #[test]
    fn clear_drops_records_and_blob() {
        let mut blob = MemoryStore::new();
        let mut store = RecordStore::new();
        store.append(vec![record("a.xlsx", "123", "01", "2024")]);
        store.persist(&mut blob, now()).unwrap();

        store.clear(&mut blob).unwrap();
        assert!(store.is_empty());
        assert_eq!(blob.get(DATA_KEY).unwrap(), None);
    }

    #[test]
    fn lookup_table_envelope_roundtrip() {
        let mut blob = MemoryStore::new();
        let aliases = vec![crate::mappings::AliasEntry {
            nome_originale: "Slot".to_string(),
            nome_visualizzato: "Slot Machines".to_string(),
        }];
        persist_table(&mut blob, ALIAS_KEY, &aliases, now()).unwrap();

        let envelope = load_table::<Vec<crate::mappings::AliasEntry>>(&blob, ALIAS_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(envelope.version, STORAGE_VERSION);
        assert_eq!(envelope.data, aliases);
    }
}
