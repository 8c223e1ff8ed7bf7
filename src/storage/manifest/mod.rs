//! Version tracking for the live table set
//!
//! ## Responsibilities
//! 1. **Live tables**: which tables exist, per level, in the current version
//! 2. **Atomic edits**: flush, compaction and ingest results apply as one unit
//! 3. **Stats slot**: each table's stats live next to its metadata
//!
//! Persisting edits is the store's job; only the in-memory view lives here.

mod version;

pub use version::{EditOutcome, TableMetadata, Version, VersionEdit};
