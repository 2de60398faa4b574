//! Ingestion, normalization and analytics engine for gaming-industry
//! regulatory spreadsheet reports.
//!
//! The pipeline is one-way: raw file -> format detection -> dialect parsing
//! -> enrichment chain -> deduplication -> record store -> filter index ->
//! filter evaluation -> aggregation. Four structurally different spreadsheet
//! dialects are detected heuristically and normalized into a single
//! canonical record shape, with Italian-locale numeric round-tripping and
//! Excel serial-date handling.
//!
//! Parsing is DETERMINISTIC: the same file always yields the same records.

pub mod analytics;
pub mod export;
pub mod filters;
pub mod formats;
pub mod mappings;
pub mod numeric;
pub mod records;
pub mod state;
pub mod store;
pub mod workbook;

pub use analytics::{aggregate, humanize_label, summary_stats, Metric};
pub use filters::{Dimension, FilterIndex, FilterSelection};
pub use formats::{detect_format, parse_rows};
pub use mappings::{AliasEntry, Mappings, RegistryEntry, SectorEntry};
pub use numeric::{format_italian, format_italian_f64, parse_italian};
pub use records::{FileFormat, Record, STORAGE_VERSION};
pub use state::{Dashboard, Debouncer, EngineConfig, IngestReport};
pub use store::{BlobStore, DirStore, MemoryStore, RecordStore};
