//! Error taxonomy for the tzsync core.
//!
//! Every failure from heed, zip, rrule, rkyv or the transport layer is
//! wrapped into one of these kinds before it leaves a data source, the diff
//! engine or the orchestrator.

/// Result alias used throughout `tzsync-core`.
pub type Result<T, E = TzError> = std::result::Result<T, E>;

/// Error type for all fallible operations in the tzsync core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TzError {
    /// The origin (archive path, URL or store) could not be fetched or opened.
    #[error("source {origin} unavailable: {reason}")]
    SourceUnavailable {
        /// Origin description (path, URL or store location).
        origin: String,
        /// Underlying failure.
        reason: String,
    },

    /// A manifest, alias or zone entry failed to parse.
    #[error("malformed dataset entry {entry}: {reason}")]
    MalformedDataset {
        /// Entry name within the dataset.
        entry: String,
        /// What was wrong with it.
        reason: String,
    },

    /// No zone with this id, directly or through an alias.
    #[error("unknown zone {id}")]
    UnknownZone {
        /// The id or alias that was requested.
        id: String,
    },

    /// A date-time value is not well formed.
    #[error("bad date-time value {value:?}")]
    BadTimeValue {
        /// The rejected input.
        value: String,
    },

    /// Unexpected failure from the recurrence library, the store or the
    /// filesystem.
    #[error("internal fault during {context}: {reason}")]
    InternalFault {
        /// Which zone / operation was running.
        context: String,
        /// Underlying failure.
        reason: String,
    },

    /// Configuration could not be read or written.
    #[error("config error: {0}")]
    Config(String),
}

impl TzError {
    pub(crate) fn unavailable(origin: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn malformed(entry: impl Into<String>, reason: impl ToString) -> Self {
        Self::MalformedDataset {
            entry: entry.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn internal(context: impl Into<String>, reason: impl ToString) -> Self {
        Self::InternalFault {
            context: context.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn unknown_zone(id: impl Into<String>) -> Self {
        Self::UnknownZone { id: id.into() }
    }

    pub(crate) fn bad_time(value: impl Into<String>) -> Self {
        Self::BadTimeValue {
            value: value.into(),
        }
    }

    /// True for the kinds that client queries report as "not found".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownZone { .. } | Self::BadTimeValue { .. })
    }
}

/// Turns "not found" kinds into `Ok(None)`, leaving hard failures in place.
pub(crate) trait NotFoundExt<T> {
    fn or_not_found(self) -> Result<Option<T>>;
}

impl<T> NotFoundExt<T> for Result<T> {
    fn or_not_found(self) -> Result<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => {
                tracing::debug!(error = %e, "query resolved to not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
