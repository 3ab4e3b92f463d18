//! Sync state for secondary nodes
//!
//! Records which dataset version was last applied from the primary, so a
//! restarted node knows where it stands before its first reload.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::error::{Result, TzError};

/// State file name inside the state directory
pub const STATE_FILE: &str = "sync_state.rkyv";

/// State after the last successful update
#[derive(Archive, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[rkyv(derive(Debug))]
pub struct SyncState {
    /// dtstamp of the last applied update (seconds since UNIX epoch)
    pub dtstamp_secs: i64,
    /// Monotonically increasing sync version
    pub version: u64,
    /// Origin the last update came from
    pub last_origin: Option<String>,
}

impl SyncState {
    /// Create an empty sync state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn path(state_dir: &Path) -> PathBuf {
        state_dir.join(STATE_FILE)
    }

    /// Load sync state, or return empty state if not found
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let state_path = Self::path(state_dir);
        let context = || format!("read {}", state_path.display());

        if !state_path.exists() {
            return Ok(Self::new());
        }

        let bytes = std::fs::read(&state_path).map_err(|e| TzError::internal(context(), e))?;
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(&bytes);

        let archived = rkyv::access::<ArchivedSyncState, RkyvError>(&aligned)
            .map_err(|e| TzError::internal(context(), e))?;
        let state: Self = rkyv::deserialize::<Self, RkyvError>(archived)
            .map_err(|e| TzError::internal(context(), e))?;

        Ok(state)
    }

    /// Save sync state
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let state_path = Self::path(state_dir);
        let context = || format!("write {}", state_path.display());

        std::fs::create_dir_all(state_dir).map_err(|e| TzError::internal(context(), e))?;
        let bytes =
            rkyv::to_bytes::<RkyvError>(self).map_err(|e| TzError::internal(context(), e))?;
        std::fs::write(&state_path, &bytes).map_err(|e| TzError::internal(context(), e))?;
        Ok(())
    }

    /// Record an applied update
    pub fn record_update(&mut self, dtstamp: DateTime<Utc>, origin: Option<String>) {
        self.version += 1;
        self.dtstamp_secs = dtstamp.timestamp();
        if origin.is_some() {
            self.last_origin = origin;
        }
    }

    /// dtstamp of the last applied update, if any
    #[must_use]
    pub fn dtstamp(&self) -> Option<DateTime<Utc>> {
        if self.version == 0 {
            return None;
        }
        DateTime::from_timestamp(self.dtstamp_secs, 0)
    }
}
