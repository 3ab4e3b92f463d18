//! Zip archive data source
//!
//! Archive layout:
//! - `info.txt`: manifest lines, `buildTime=<timestamp>` sets the dtstamp
//! - `aliases.txt`: `alias=target1,target2,...` lines
//! - `zoneinfo/<id>.ics`: one VTIMEZONE definition per zone

use std::fs::File;
use std::io::Read as _;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SubsecRound as _, Utc};
use tzsync_transport::local::OriginStamp;
use tzsync_transport::{FetchOptions, FetchedArchive, Origin};
use zip::ZipArchive;
use zip::result::ZipError;

use super::{DataSource, DatasetUpdate};
use crate::alias::AliasTable;
use crate::datetime::parse_dtstamp;
use crate::error::{Result, TzError};
use crate::snapshot::{SourceKind, Snapshot, ZoneRecord};

/// Manifest entry name
pub const MANIFEST_ENTRY: &str = "info.txt";
/// Alias table entry name
pub const ALIASES_ENTRY: &str = "aliases.txt";
const ZONE_DIR: &str = "zoneinfo/";
const ZONE_EXT: &str = ".ics";

/// Loads snapshots from a zip archive at a local path or URL.
pub struct ArchiveSource {
    origin: Origin,
    options: FetchOptions,
    /// Scratch file backing the installed snapshot
    current: Option<FetchedArchive>,
    /// Scratch file from a load not yet installed
    pending: Option<(FetchedArchive, Option<OriginStamp>)>,
    /// Origin size/mtime at the installed load (local origins only)
    stamp: Option<OriginStamp>,
}

impl ArchiveSource {
    /// Create a source for an origin string. Nothing is fetched yet.
    ///
    /// # Errors
    /// Returns `SourceUnavailable` if the origin string is not valid.
    pub fn open(origin: &str, timeout: Option<Duration>) -> Result<Self> {
        let parsed = Origin::parse(origin).map_err(|e| TzError::unavailable(origin, e))?;
        Ok(Self::new(parsed, timeout))
    }

    #[must_use]
    pub fn new(origin: Origin, timeout: Option<Duration>) -> Self {
        Self {
            origin,
            options: FetchOptions { timeout },
            current: None,
            pending: None,
            stamp: None,
        }
    }

    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    fn local_stamp(&self) -> Result<Option<OriginStamp>> {
        match self.origin.local_path() {
            Some(path) => tzsync_transport::local::stamp(path)
                .map(Some)
                .map_err(|e| TzError::unavailable(self.origin.to_string(), e)),
            None => Ok(None),
        }
    }
}

impl DataSource for ArchiveSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Archive
    }

    fn describe(&self) -> String {
        format!("archive {}", self.origin)
    }

    fn load(&mut self) -> Result<Snapshot> {
        let stamp = self.local_stamp()?;
        let fetched = tzsync_transport::fetch(&self.origin, &self.options)
            .map_err(|e| TzError::unavailable(self.origin.to_string(), e))?;

        let fetched_at = DateTime::<Utc>::from(fetched.fetched_at()).trunc_subsecs(0);
        let snapshot = read_archive(fetched.path(), fetched_at)?;

        tracing::debug!(
            origin = %self.origin,
            zones = snapshot.len(),
            aliases = snapshot.aliases().len(),
            "parsed archive"
        );

        // A load that was never installed is superseded
        if let Some((stale, _)) = self.pending.replace((fetched, stamp)) {
            release(stale);
        }
        Ok(snapshot)
    }

    fn has_new_data(&mut self) -> Result<bool> {
        if self.origin.is_remote() {
            return Ok(true);
        }
        let current = self.local_stamp()?;
        Ok(self.stamp.is_none() || current != self.stamp)
    }

    fn apply_update(&mut self, update: &DatasetUpdate) -> Result<()> {
        // An archive can only be repointed, not written to
        let Some(origin) = &update.origin else {
            return Err(TzError::unavailable(
                self.origin.to_string(),
                "archive source can only apply origin-based updates",
            ));
        };
        let parsed = Origin::parse(origin).map_err(|e| TzError::unavailable(origin, e))?;
        if parsed != self.origin {
            tracing::info!(from = %self.origin, to = %parsed, "retargeting archive source");
            self.origin = parsed;
            self.stamp = None;
        }
        Ok(())
    }

    fn installed(&mut self) {
        if let Some((fetched, stamp)) = self.pending.take() {
            self.stamp = stamp;
            if let Some(previous) = self.current.replace(fetched) {
                release(previous);
            }
        }
    }

    fn close(&mut self) {
        if let Some((fetched, _)) = self.pending.take() {
            release(fetched);
        }
        if let Some(fetched) = self.current.take() {
            release(fetched);
        }
    }
}

fn release(fetched: FetchedArchive) {
    if let Err(e) = fetched.release() {
        tracing::warn!(error = %e, "failed to release archive scratch file");
    }
}

/// Parse an archive file into a snapshot.
///
/// `fallback_dtstamp` is used when the manifest carries no build time.
///
/// # Errors
/// `SourceUnavailable` if the file cannot be opened, `MalformedDataset` if
/// it is not a zip archive or an entry fails to parse.
pub fn read_archive(path: &Path, fallback_dtstamp: DateTime<Utc>) -> Result<Snapshot> {
    let location = path.display().to_string();
    let file = File::open(path).map_err(|e| TzError::unavailable(&location, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| TzError::malformed(&location, e))?;

    let dtstamp = match read_entry(&mut archive, MANIFEST_ENTRY)? {
        Some(manifest) => build_time(&manifest)?.unwrap_or(fallback_dtstamp),
        None => fallback_dtstamp,
    };

    let aliases_text = read_entry(&mut archive, ALIASES_ENTRY)?.unwrap_or_default();
    let aliases = AliasTable::parse(&aliases_text);

    let mut records = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| TzError::malformed(&location, e))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(id) = name
            .strip_prefix(ZONE_DIR)
            .and_then(|rest| rest.strip_suffix(ZONE_EXT))
        else {
            continue;
        };

        let mut definition = String::new();
        entry
            .read_to_string(&mut definition)
            .map_err(|e| TzError::malformed(&name, e))?;
        records.push(ZoneRecord::new(id, definition, dtstamp)?);
    }

    Snapshot::new(records, aliases, aliases_text, dtstamp, SourceKind::Archive)
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<String>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(TzError::malformed(name, e)),
    };
    let mut text = String::new();
    entry
        .read_to_string(&mut text)
        .map_err(|e| TzError::malformed(name, e))?;
    Ok(Some(text))
}

/// `buildTime` from manifest text; a value without a designator is UTC
fn build_time(manifest: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(value) = manifest
        .lines()
        .find_map(|line| line.trim().strip_prefix("buildTime="))
    else {
        return Ok(None);
    };
    parse_dtstamp(value)
        .map(Some)
        .ok_or_else(|| TzError::malformed(MANIFEST_ENTRY, format!("bad buildTime {value:?}")))
}
