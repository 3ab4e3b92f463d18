//! Expansion of zone rules into offset-change events, and their cache
//!
//! An expansion lists every observance onset of one zone inside a UTC
//! window. Results are cached per (zone, start, end) and tagged with the
//! generation of the snapshot they were computed from.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use parking_lot::RwLock;
use serde::{Serialize, Serializer};

use crate::datetime::start_of_day;
use crate::error::{Result, TzError};
use crate::snapshot::{Snapshot, ZoneRecord};
use crate::stats::{Counter, OperationalCounters};
use crate::vtimezone::UtcOffset;

/// Length of the window used when no end is given
pub const DEFAULT_WINDOW_WEEKS: i64 = 520;

/// Cache key: canonical zone id and a UTC window `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpansionKey {
    pub tzid: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExpansionKey {
    /// Build a key, filling omitted bounds.
    ///
    /// An omitted start is midnight UTC of `now`'s day; an omitted end is
    /// start plus [`DEFAULT_WINDOW_WEEKS`]. Two calls on the same day with
    /// the same arguments produce equal keys.
    #[must_use]
    pub fn new(
        tzid: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let start = start.unwrap_or_else(|| start_of_day(now));
        let end = end.unwrap_or_else(|| start + Duration::weeks(DEFAULT_WINDOW_WEEKS));
        Self {
            tzid: tzid.into(),
            start,
            end,
        }
    }
}

/// One observance beginning inside an expansion window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observance {
    pub name: String,
    /// Local wall-clock time at which the observance begins
    pub onset: NaiveDateTime,
    #[serde(serialize_with = "display")]
    pub utc_offset_from: UtcOffset,
    #[serde(serialize_with = "display")]
    pub utc_offset_to: UtcOffset,
}

fn display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Expansion of one zone over one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpansionResult {
    pub tzid: String,
    /// dtstamp of the snapshot the expansion was computed from
    pub dtstamp: DateTime<Utc>,
    /// Ascending by UTC onset
    pub observances: Vec<Observance>,
}

/// Expand a zone's rules over `[start, end)`.
///
/// Events are ordered by UTC onset. When two observances begin at the same
/// instant the one discovered first is kept.
///
/// # Errors
/// Returns `InternalFault` if the recurrence library fails.
pub fn expand_zone(
    record: &ZoneRecord,
    dtstamp: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<ExpansionResult> {
    let transitions = record
        .rules()
        .transitions(start, end)
        .map_err(|e| TzError::internal(format!("expand {}", record.id), e))?;

    let mut by_onset: BTreeMap<DateTime<Utc>, Observance> = BTreeMap::new();
    for transition in transitions {
        by_onset
            .entry(transition.onset_utc)
            .or_insert_with(|| Observance {
                name: transition.name,
                onset: transition.onset_local,
                utc_offset_from: transition.offset_from,
                utc_offset_to: transition.offset_to,
            });
    }

    Ok(ExpansionResult {
        tzid: record.id.clone(),
        dtstamp,
        observances: by_onset.into_values().collect(),
    })
}

struct CacheEntry {
    generation: u64,
    created: DateTime<Utc>,
    result: Arc<ExpansionResult>,
}

/// Expansion results keyed by [`ExpansionKey`]
#[derive(Default)]
pub struct ExpansionCache {
    entries: RwLock<HashMap<ExpansionKey, CacheEntry>>,
}

impl ExpansionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `key`, only if computed from `generation`
    #[must_use]
    pub fn get(&self, key: &ExpansionKey, generation: u64) -> Option<Arc<ExpansionResult>> {
        self.entries
            .read()
            .get(key)
            .filter(|entry| entry.generation == generation)
            .map(|entry| Arc::clone(&entry.result))
    }

    pub fn insert(&self, key: ExpansionKey, generation: u64, result: Arc<ExpansionResult>) {
        self.entries.write().insert(
            key,
            CacheEntry {
                generation,
                created: Utc::now(),
                result,
            },
        );
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Creation time of the oldest cached entry
    #[must_use]
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.entries.read().values().map(|entry| entry.created).min()
    }

    /// Cached expansion for `key` against `snapshot`, computing it on a miss.
    ///
    /// The key's id must already be canonical. Concurrent misses for one key
    /// may both compute; the last insert wins.
    ///
    /// # Errors
    /// `UnknownZone` if the id is not in the snapshot, `InternalFault` if
    /// the expansion fails.
    pub fn get_or_compute(
        &self,
        snapshot: &Snapshot,
        key: &ExpansionKey,
        counters: &OperationalCounters,
    ) -> Result<Arc<ExpansionResult>> {
        counters.incr(Counter::ExpansionFetches);

        let generation = snapshot.generation();
        if let Some(hit) = self.get(key, generation) {
            counters.incr(Counter::ExpansionHits);
            return Ok(hit);
        }

        let record = snapshot
            .get(&key.tzid)
            .ok_or_else(|| TzError::unknown_zone(&key.tzid))?;

        let started = Instant::now();
        let result = Arc::new(expand_zone(record, snapshot.dtstamp(), key.start, key.end)?);
        counters.record(Counter::Expansions, Counter::ExpansionMillis, started);

        tracing::debug!(
            tzid = %key.tzid,
            observances = result.observances.len(),
            generation,
            "expansion computed"
        );
        self.insert(key.clone(), generation, Arc::clone(&result));
        Ok(result)
    }
}
