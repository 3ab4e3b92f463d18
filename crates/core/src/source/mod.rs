//! Data sources: where a full dataset is loaded from
//!
//! A source always rebuilds the whole dataset on `load`. The orchestrator
//! serializes calls into a source behind its reload lock, so
//! implementations take `&mut self` and need no internal locking.

pub mod archive;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::TzConfig;
use crate::diff::DiffEntry;
use crate::error::{Result, TzError};
use crate::snapshot::{SourceKind, Snapshot};

pub use archive::ArchiveSource;
pub use store::StoreSource;

/// A change set to apply to a source, produced by diffing a candidate
#[derive(Debug, Clone)]
pub struct DatasetUpdate {
    /// Dataset timestamp to record with the update
    pub dtstamp: DateTime<Utc>,
    /// Differences against the live snapshot, sorted
    pub entries: Vec<DiffEntry>,
    /// The snapshot the entries were computed from
    pub candidate: Arc<Snapshot>,
    /// Origin the candidate was loaded from, when it was an archive
    pub origin: Option<String>,
}

/// Loads and reloads a complete dataset
pub trait DataSource: Send {
    fn kind(&self) -> SourceKind;

    /// Origin description for logs and reports
    fn describe(&self) -> String;

    /// Load the full dataset.
    ///
    /// # Errors
    /// `SourceUnavailable` if the origin cannot be reached or is empty,
    /// `MalformedDataset` if an entry fails to parse.
    fn load(&mut self) -> Result<Snapshot>;

    /// Whether the origin has changed since the last installed load.
    ///
    /// # Errors
    /// Returns an error if the origin cannot be inspected.
    fn has_new_data(&mut self) -> Result<bool>;

    /// Make a diffed update durable in this source.
    ///
    /// # Errors
    /// Returns an error if the source cannot be written.
    fn apply_update(&mut self, update: &DatasetUpdate) -> Result<()>;

    /// Called once the snapshot from the last `load` is installed.
    /// Resources held by the previous load may be released here.
    fn installed(&mut self) {}

    /// Release every resource held by the source
    fn close(&mut self);
}

/// Builds a data source; tried in order at startup
pub type SourceConstructor = Box<dyn FnOnce() -> Result<Box<dyn DataSource>> + Send>;

/// Constructor for an archive source at `origin`
#[must_use]
pub fn archive_constructor(origin: String, timeout: Option<Duration>) -> SourceConstructor {
    Box::new(move || {
        let source = ArchiveSource::open(&origin, timeout)?;
        Ok(Box::new(source) as Box<dyn DataSource>)
    })
}

/// Constructor for a store source at `path`
#[must_use]
pub fn store_constructor(path: PathBuf) -> SourceConstructor {
    Box::new(move || {
        let source = StoreSource::open(&path)?;
        Ok(Box::new(source) as Box<dyn DataSource>)
    })
}

/// Startup order from configuration: the store when configured, then the
/// archive.
///
/// # Errors
/// Returns `Config` when neither a store nor an archive is configured.
pub fn constructors_from_config(config: &TzConfig) -> Result<Vec<SourceConstructor>> {
    let mut constructors = Vec::new();
    if let Some(path) = &config.store_path {
        constructors.push(store_constructor(path.clone()));
    }
    if let Some(url) = &config.tzdata_url {
        constructors.push(archive_constructor(url.clone(), config.fetch_timeout()));
    }
    if constructors.is_empty() {
        return Err(TzError::Config(
            "neither store_path nor tzdata_url is configured".to_string(),
        ));
    }
    Ok(constructors)
}
