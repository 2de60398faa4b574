//! Engine state: the record store, the lookup tables, the filter index and
//! the blob store behind them, driven through one explicit struct.
//!
//! The engine is single-writer: ingestion and re-enrichment are chunked
//! (progress is reported between chunks) and guarded by a busy flag — a
//! second pass requested while one is in flight is rejected, never
//! interleaved, because no atomic snapshot of the store exists.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::filters::{FilterIndex, FilterSelection};
use crate::formats::parse_rows;
use crate::mappings::{AliasEntry, Mappings, RegistryEntry, SectorEntry};
use crate::records::Record;
use crate::store::{
    persist_table, load_table, BlobStore, PersistReport, RecordStore, ALIAS_KEY, REGISTRY_KEY,
    SECTOR_KEY,
};
use crate::workbook::read_rows;

/// Tuning knobs. Defaults match the sizes the dataset was profiled at.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Records enriched per chunk before reporting progress.
    pub chunk_size: usize,
    /// Filter-input coalescing window.
    pub debounce: Duration,
    /// Table page size.
    pub page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            chunk_size: 1000,
            debounce: Duration::from_millis(300),
            page_size: 50,
        }
    }
}

/// Outcome of one ingestion batch. A malformed file aborts only itself;
/// sibling files in the same batch still land.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_ok: usize,
    /// (file name, error) per failed file.
    pub files_failed: Vec<(String, String)>,
    pub parsed: usize,
    pub added: usize,
    pub duplicates: usize,
    pub persist: PersistReport,
}

pub struct Dashboard {
    store: RecordStore,
    mappings: Mappings,
    index: FilterIndex,
    blob: Box<dyn BlobStore>,
    busy: bool,
    pub config: EngineConfig,
}

impl Dashboard {
    pub fn new(blob: Box<dyn BlobStore>, config: EngineConfig) -> Self {
        Dashboard {
            store: RecordStore::new(),
            mappings: Mappings::default(),
            index: FilterIndex::default(),
            blob,
            busy: false,
            config,
        }
    }

    /// Load all persisted state: dataset plus the three lookup tables.
    /// A dataset written by an older schema version is re-persisted
    /// immediately to complete the migration. Returns records loaded.
    pub fn load_all(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let report = self.store.load(self.blob.as_ref())?;
        if report.migrated {
            self.store.persist(self.blob.as_mut(), now)?;
        }

        if let Some(envelope) = load_table::<Vec<RegistryEntry>>(self.blob.as_ref(), REGISTRY_KEY)? {
            self.mappings.registry = envelope.data;
        }
        if let Some(envelope) = load_table::<Vec<AliasEntry>>(self.blob.as_ref(), ALIAS_KEY)? {
            self.mappings.aliases = envelope.data;
        }
        if let Some(envelope) = load_table::<Vec<SectorEntry>>(self.blob.as_ref(), SECTOR_KEY)? {
            self.mappings.sectors = envelope.data;
        }
        self.mappings.rebuild_maps();

        self.index = FilterIndex::build(self.store.records());
        Ok(report.loaded)
    }

    pub fn records(&self) -> &[Record] {
        self.store.records()
    }

    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    pub fn index(&self) -> &FilterIndex {
        &self.index
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    // =========================================================================
    // INGESTION
    // =========================================================================

    /// Ingest a batch of report files: read, detect, parse, enrich (in
    /// chunks, reporting progress), deduplicate, persist and re-index.
    /// Rejected with an error while another pass is in flight.
    fn ensure_idle(&self) -> Result<()> {
        if self.busy {
            bail!("an ingestion or enrichment pass is already in progress");
        }
        Ok(())
    }

    pub fn ingest_files(
        &mut self,
        paths: &[PathBuf],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<IngestReport> {
        self.ensure_idle()?;
        self.busy = true;
        let result = self.ingest_inner(paths, progress);
        self.busy = false;
        result
    }

    fn ingest_inner(
        &mut self,
        paths: &[PathBuf],
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut batch: Vec<Record> = Vec::new();

        for path in paths {
            let file_name = file_name_of(path);
            match read_rows(path).and_then(|rows| parse_rows(&rows, &file_name)) {
                Ok(records) => {
                    report.files_ok += 1;
                    batch.extend(records);
                }
                Err(err) => {
                    report.files_failed.push((file_name, format!("{err:#}")));
                }
            }
        }
        report.parsed = batch.len();

        let total = batch.len();
        let mut done = 0;
        for chunk in batch.chunks_mut(self.config.chunk_size) {
            for record in chunk.iter_mut() {
                self.mappings.enrich(record);
            }
            done += chunk.len();
            progress(done, total);
        }

        let (added, duplicates) = self.store.append(batch);
        report.added = added;
        report.duplicates = duplicates;

        report.persist = self.store.persist(self.blob.as_mut(), Utc::now())?;
        self.index = FilterIndex::build(self.store.records());
        Ok(report)
    }

    // =========================================================================
    // LOOKUP TABLES
    // =========================================================================

    /// Replace the dealer registry and re-run the enrichment chain over the
    /// whole store. Returns records re-enriched. Rejected while a pass is in
    /// flight, before the table is touched: a busy rejection must leave both
    /// the table and the store as they were.
    pub fn set_registry(
        &mut self,
        rows: Vec<RegistryEntry>,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<usize> {
        self.ensure_idle()?;
        self.mappings.set_registry(rows);
        persist_table(self.blob.as_mut(), REGISTRY_KEY, &self.mappings.registry, Utc::now())?;
        self.reapply_mappings(progress)
    }

    pub fn set_aliases(
        &mut self,
        rows: Vec<AliasEntry>,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<usize> {
        self.ensure_idle()?;
        self.mappings.set_aliases(rows);
        persist_table(self.blob.as_mut(), ALIAS_KEY, &self.mappings.aliases, Utc::now())?;
        self.reapply_mappings(progress)
    }

    pub fn set_sectors(
        &mut self,
        rows: Vec<SectorEntry>,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<usize> {
        self.ensure_idle()?;
        self.mappings.set_sectors(rows);
        persist_table(self.blob.as_mut(), SECTOR_KEY, &self.mappings.sectors, Utc::now())?;
        self.reapply_mappings(progress)
    }

    /// Re-run the enrichment chain over the entire store (the most expensive
    /// reactive operation), then persist and re-index. Busy-guarded like
    /// ingestion.
    pub fn reapply_mappings(&mut self, progress: &mut dyn FnMut(usize, usize)) -> Result<usize> {
        self.ensure_idle()?;
        self.busy = true;

        let total = self.store.len();
        let mut done = 0;
        for chunk in self.store.records_mut().chunks_mut(self.config.chunk_size) {
            for record in chunk.iter_mut() {
                self.mappings.enrich(record);
            }
            done += chunk.len();
            progress(done, total);
        }

        let result = self
            .store
            .persist(self.blob.as_mut(), Utc::now())
            .map(|_| total);
        self.index = FilterIndex::build(self.store.records());
        self.busy = false;
        result
    }

    // =========================================================================
    // FILTERING AND MAINTENANCE
    // =========================================================================

    pub fn apply_filters(&self, selection: &FilterSelection) -> Vec<u32> {
        self.index.evaluate(selection, self.store.records())
    }

    pub fn records_at<'a>(&'a self, positions: &[u32]) -> Vec<&'a Record> {
        positions
            .iter()
            .map(|&pos| &self.store.records()[pos as usize])
            .collect()
    }

    /// One table page of filtered positions.
    pub fn page<'a>(&self, positions: &'a [u32], page: usize) -> &'a [u32] {
        let start = page * self.config.page_size;
        if start >= positions.len() {
            return &[];
        }
        let end = (start + self.config.page_size).min(positions.len());
        &positions[start..end]
    }

    /// Age out records older than `months`, persist and re-index.
    pub fn cleanup(&mut self, months: u32, now: DateTime<Utc>) -> Result<usize> {
        let removed = self.store.retention_cleanup(months, now);
        self.store.persist(self.blob.as_mut(), now)?;
        self.index = FilterIndex::build(self.store.records());
        Ok(removed)
    }

    /// Drop all records and the persisted dataset blob. Lookup tables are
    /// kept: they are user-maintained state, not derived from the dataset.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear(self.blob.as_mut())?;
        self.index = FilterIndex::build(self.store.records());
        Ok(())
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// =============================================================================
// DEBOUNCER
// =============================================================================

/// Coalesces bursts of filter-input events: each request restarts the
/// window; `poll` fires once the window has elapsed with no new request.
/// Time is injected so the behavior is testable without sleeping.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending_since: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            pending_since: None,
        }
    }

    pub fn request(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending_since {
            Some(since) if now.duration_since(since) >= self.delay => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
