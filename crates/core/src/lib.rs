//! tzsync-core: timezone dataset cache and sync engine
//!
//! Loads a timezone dataset from an archive or a key-value store, serves
//! zone definitions, alias lookups, expansions and conversions from an
//! immutable snapshot, and keeps secondaries in step by diffing a candidate
//! against the live dataset before reloading.

pub mod admin;
pub mod alias;
pub mod config;
pub mod datetime;
pub mod diff;
pub mod error;
pub mod expand;
pub mod hash;
pub mod orchestrator;
pub mod snapshot;
pub mod source;
pub mod stats;
pub mod store;
pub mod sync_state;
pub mod vtimezone;

pub use alias::AliasTable;
pub use config::TzConfig;
pub use diff::{DiffEntry, DiffKind};
pub use error::{Result, TzError};
pub use expand::{ExpansionCache, ExpansionKey, ExpansionResult, Observance};
pub use hash::DefinitionHash;
pub use orchestrator::{Orchestrator, OrchestratorOptions, ReloadOutcome, State};
pub use snapshot::{AliasLookup, Snapshot, SourceKind, ZoneRecord, ZoneSummary};
pub use source::{ArchiveSource, DataSource, DatasetUpdate, SourceConstructor, StoreSource};
pub use stats::{Counter, OperationalCounters, Stat};
pub use store::{KvStore, LmdbStore};
pub use sync_state::SyncState;
