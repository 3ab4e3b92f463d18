//! Key-value store data source
//!
//! Zones, per-zone timestamps, aliases and the dataset timestamp live under
//! prefixed keys in a `KvStore`. Updates are written in place and become
//! visible on the next load.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{DataSource, DatasetUpdate};
use crate::alias::AliasTable;
use crate::datetime::{format_dtstamp, parse_dtstamp};
use crate::diff::DiffEntry;
use crate::error::{Result, TzError};
use crate::snapshot::{SourceKind, Snapshot, ZoneRecord};
use crate::store::{
    ALIAS_PREFIX, DTSTAMP_KEY, KvStore, LmdbStore, ZONE_MODIFIED_PREFIX, ZONE_PREFIX,
};

/// Loads snapshots from a persistent key-value store.
pub struct StoreSource {
    store: Arc<dyn KvStore>,
    /// dtstamp of the last load
    loaded: Option<DateTime<Utc>>,
}

impl StoreSource {
    /// Open the LMDB store at `path`
    ///
    /// # Errors
    /// Returns `SourceUnavailable` if the store cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(LmdbStore::open(path)?)))
    }

    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            loaded: None,
        }
    }

    fn stored_dtstamp(&self) -> Result<Option<DateTime<Utc>>> {
        match self.store.get(DTSTAMP_KEY)? {
            Some(value) => parse_dtstamp(&value)
                .map(Some)
                .ok_or_else(|| TzError::malformed(DTSTAMP_KEY, format!("bad timestamp {value:?}"))),
            None => Ok(None),
        }
    }

    /// Replace the store contents with a snapshot
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub fn import(&mut self, snapshot: &Snapshot) -> Result<usize> {
        let mut batch: Vec<(String, Option<String>)> = Vec::new();

        for prefix in [ZONE_PREFIX, ZONE_MODIFIED_PREFIX, ALIAS_PREFIX] {
            for (key, _) in self.store.iterate(prefix)? {
                batch.push((key, None));
            }
        }
        for record in snapshot.zones() {
            batch.extend(zone_writes(&record.id, Some(record)));
        }
        for (alias, targets) in snapshot.aliases().iter() {
            batch.push((format!("{ALIAS_PREFIX}{alias}"), Some(targets.join(","))));
        }
        batch.push((DTSTAMP_KEY.to_string(), Some(format_dtstamp(snapshot.dtstamp()))));

        self.store.write_batch(&batch)?;
        tracing::info!(
            store = %self.store.location(),
            zones = snapshot.len(),
            aliases = snapshot.aliases().len(),
            "imported snapshot into store"
        );
        Ok(snapshot.len())
    }
}

/// Writes for one zone; `None` deletes it
fn zone_writes(id: &str, record: Option<&ZoneRecord>) -> [(String, Option<String>); 2] {
    [
        (
            format!("{ZONE_PREFIX}{id}"),
            record.map(|r| r.definition.to_string()),
        ),
        (
            format!("{ZONE_MODIFIED_PREFIX}{id}"),
            record.map(|r| format_dtstamp(r.last_modified)),
        ),
    ]
}

impl DataSource for StoreSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Store
    }

    fn describe(&self) -> String {
        format!("store {}", self.store.location())
    }

    fn load(&mut self) -> Result<Snapshot> {
        let zones = self.store.iterate(ZONE_PREFIX)?;
        if zones.is_empty() {
            return Err(TzError::unavailable(
                self.store.location(),
                "store holds no zones",
            ));
        }

        let dtstamp = self.stored_dtstamp()?.unwrap_or_default();

        let modified: BTreeMap<String, String> = self
            .store
            .iterate(ZONE_MODIFIED_PREFIX)?
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(ZONE_MODIFIED_PREFIX)
                    .map(|id| (id.to_string(), value))
            })
            .collect();

        let mut records = Vec::with_capacity(zones.len());
        for (key, definition) in zones {
            let Some(id) = key.strip_prefix(ZONE_PREFIX) else {
                continue;
            };
            let last_modified = match modified.get(id) {
                Some(value) => parse_dtstamp(value).ok_or_else(|| {
                    TzError::malformed(format!("{ZONE_MODIFIED_PREFIX}{id}"), "bad timestamp")
                })?,
                None => dtstamp,
            };
            records.push(ZoneRecord::new(id, definition, last_modified)?);
        }

        let mut alias_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in self.store.iterate(ALIAS_PREFIX)? {
            let Some(alias) = key.strip_prefix(ALIAS_PREFIX) else {
                continue;
            };
            let targets: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if !targets.is_empty() {
                alias_map.insert(alias.to_string(), targets);
            }
        }
        let aliases = AliasTable::from_map(alias_map);
        let aliases_text = aliases.to_source_text();

        let snapshot = Snapshot::new(records, aliases, aliases_text, dtstamp, SourceKind::Store)?;
        self.loaded = Some(dtstamp);
        Ok(snapshot)
    }

    fn has_new_data(&mut self) -> Result<bool> {
        let stored = self.stored_dtstamp()?;
        Ok(stored.is_some() && stored != self.loaded)
    }

    fn apply_update(&mut self, update: &DatasetUpdate) -> Result<()> {
        let candidate = &update.candidate;
        let mut batch: Vec<(String, Option<String>)> = Vec::new();

        for entry in &update.entries {
            match entry {
                DiffEntry::Added { id } | DiffEntry::Changed { id, .. } => {
                    let record = candidate.get(id).ok_or_else(|| {
                        TzError::internal("apply update", format!("{id} missing from candidate"))
                    })?;
                    // Applied zones are stamped with the update time
                    let stamped =
                        ZoneRecord::new(id.as_str(), Arc::clone(&record.definition), update.dtstamp)?;
                    batch.extend(zone_writes(id, Some(&stamped)));
                }
                DiffEntry::Removed { id } => batch.extend(zone_writes(id, None)),
                DiffEntry::AliasChanged { id } => {
                    // The id is either an alias name or a target; only alias
                    // names have keys of their own.
                    let key = format!("{ALIAS_PREFIX}{id}");
                    match candidate.aliases().targets_of(id) {
                        Some(targets) => batch.push((key, Some(targets.join(",")))),
                        None => batch.push((key, None)),
                    }
                }
            }
        }
        batch.push((DTSTAMP_KEY.to_string(), Some(format_dtstamp(update.dtstamp))));

        self.store.write_batch(&batch)?;
        tracing::info!(
            store = %self.store.location(),
            entries = update.entries.len(),
            dtstamp = %format_dtstamp(update.dtstamp),
            "applied update to store"
        );
        Ok(())
    }

    fn close(&mut self) {
        self.loaded = None;
    }
}
