//! Sync orchestrator: owns the live snapshot and coordinates reloads
//!
//! Readers take the current snapshot with one atomic load and keep it for
//! the whole query, so a reload never blocks them and never shows them a
//! half-built dataset. Reloads and updates are serialized by the lock
//! around the active data source. A reload requested while another is in
//! flight is coalesced into it.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::{DateTime, SubsecRound as _, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;

use crate::config::TzConfig;
use crate::datetime::{self, format_dtstamp};
use crate::diff::{self, DiffEntry};
use crate::error::{NotFoundExt as _, Result, TzError};
use crate::expand::{ExpansionCache, ExpansionKey, ExpansionResult};
use crate::snapshot::{Snapshot, ZoneRecord, ZoneSummary};
use crate::source::{
    ArchiveSource, DataSource, DatasetUpdate, SourceConstructor, constructors_from_config,
};
use crate::stats::{Counter, OperationalCounters};
use crate::sync_state::SyncState;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Uninitialized,
    Ready,
    Reloading,
    /// No snapshot could ever be loaded; the empty snapshot is served
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Reloading => "reloading",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a reload request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new snapshot was installed
    Reloaded { zones: usize, generation: u64 },
    /// Another reload was already running; this request joined it
    AlreadyReloading,
}

/// Settings not tied to a particular data source
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    /// Where sync state is persisted after updates; `None` disables it
    pub state_dir: Option<PathBuf>,
    /// Timeout for fetching candidate archives
    pub fetch_timeout: Option<Duration>,
}

impl OrchestratorOptions {
    #[must_use]
    pub fn from_config(config: &TzConfig) -> Self {
        Self {
            state_dir: config.state_dir().map(PathBuf::from),
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

/// Coordinates data sources, the live snapshot, the expansion cache and
/// the operational counters.
pub struct Orchestrator {
    live: ArcSwap<Snapshot>,
    source: Mutex<Option<Box<dyn DataSource>>>,
    state: Mutex<State>,
    installed_once: AtomicBool,
    generation: AtomicU64,
    cache: ExpansionCache,
    counters: OperationalCounters,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// An orchestrator serving the empty snapshot; call [`Self::start`].
    #[must_use]
    pub fn new(options: OrchestratorOptions) -> Self {
        Self {
            live: ArcSwap::from_pointee(Snapshot::empty()),
            source: Mutex::new(None),
            state: Mutex::new(State::Uninitialized),
            installed_once: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            cache: ExpansionCache::new(),
            counters: OperationalCounters::new(),
            options,
        }
    }

    /// Build and start from configuration.
    ///
    /// # Errors
    /// Returns `Config` when no data source is configured. A configured
    /// source that fails to load leaves the orchestrator `Failed`, not an
    /// error.
    pub fn from_config(config: &TzConfig) -> Result<Self> {
        let constructors = constructors_from_config(config)?;
        let orchestrator = Self::new(OrchestratorOptions::from_config(config));
        orchestrator.start(constructors);
        Ok(orchestrator)
    }

    /// Try each constructor in order; the first source that loads becomes
    /// the live source. Starting again closes the previous source first.
    pub fn start(&self, constructors: Vec<SourceConstructor>) -> State {
        let mut guard = self.source.lock();
        if let Some(mut previous) = guard.take() {
            tracing::info!(source = %previous.describe(), "closing previous data source");
            previous.close();
        }
        self.set_state(State::Reloading);

        for constructor in constructors {
            self.counters.incr(Counter::TzFetches);
            let started = Instant::now();

            let mut source = match constructor() {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(error = %e, "data source could not be constructed, trying next");
                    continue;
                }
            };

            match source.load() {
                Ok(snapshot) => {
                    let installed = self.install(snapshot);
                    source.installed();
                    self.counters
                        .record(Counter::Reloads, Counter::ReloadMillis, started);
                    tracing::info!(
                        source = %source.describe(),
                        zones = installed.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "data source started"
                    );
                    *guard = Some(source);
                    self.set_state(State::Ready);
                    return State::Ready;
                }
                Err(e) => {
                    tracing::warn!(
                        source = %source.describe(),
                        error = %e,
                        "data source failed to load, trying next"
                    );
                    source.close();
                }
            }
        }

        tracing::error!("no data source could be loaded; serving an empty dataset");
        self.set_state(State::Failed);
        State::Failed
    }

    fn set_state(&self, state: State) {
        *self.state.lock() = state;
    }

    #[must_use]
    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Current snapshot. Hold on to it for the duration of one query.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.live.load_full()
    }

    #[must_use]
    pub fn counters(&self) -> &OperationalCounters {
        &self.counters
    }

    #[must_use]
    pub fn cache(&self) -> &ExpansionCache {
        &self.cache
    }

    /// Description of the active source, `None` when there is none or it is
    /// busy reloading
    #[must_use]
    pub fn source_description(&self) -> Option<String> {
        self.source
            .try_lock()
            .and_then(|guard| guard.as_ref().map(|source| source.describe()))
    }

    /// Swap in a freshly loaded snapshot, then flush the expansion cache
    fn install(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(snapshot.with_generation(generation));
        self.live.store(Arc::clone(&snapshot));
        self.cache.clear();
        self.installed_once.store(true, Ordering::SeqCst);

        tracing::info!(
            generation,
            zones = snapshot.len(),
            aliases = snapshot.aliases().len(),
            dtstamp = %format_dtstamp(snapshot.dtstamp()),
            kind = ?snapshot.kind(),
            "snapshot installed"
        );
        snapshot
    }

    /// Reload the live source. Coalesces with a reload already in flight.
    ///
    /// # Errors
    /// Returns the source's load error; the previous snapshot stays live.
    pub fn reload(&self) -> Result<ReloadOutcome> {
        let Some(mut guard) = self.source.try_lock() else {
            tracing::debug!("reload already in flight, coalescing");
            return Ok(ReloadOutcome::AlreadyReloading);
        };
        self.reload_locked(&mut guard)
    }

    /// Same as [`Self::reload`]; an explicit "check for new data" request
    /// always reloads.
    ///
    /// # Errors
    /// Returns the source's load error.
    pub fn check(&self) -> Result<ReloadOutcome> {
        self.reload()
    }

    fn reload_locked(
        &self,
        guard: &mut MutexGuard<'_, Option<Box<dyn DataSource>>>,
    ) -> Result<ReloadOutcome> {
        let Some(source) = guard.as_mut() else {
            return Err(TzError::unavailable(
                "orchestrator",
                "no data source is active",
            ));
        };

        self.set_state(State::Reloading);
        self.counters.incr(Counter::TzFetches);
        let started = Instant::now();
        tracing::info!(source = %source.describe(), "reload started");

        match source.load() {
            Ok(snapshot) => {
                let installed = self.install(snapshot);
                source.installed();
                self.counters
                    .record(Counter::Reloads, Counter::ReloadMillis, started);
                self.set_state(State::Ready);
                tracing::info!(
                    zones = installed.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "reload finished"
                );
                Ok(ReloadOutcome::Reloaded {
                    zones: installed.len(),
                    generation: installed.generation(),
                })
            }
            Err(e) => {
                let state = if self.installed_once.load(Ordering::SeqCst) {
                    State::Ready
                } else {
                    State::Failed
                };
                self.set_state(state);
                tracing::warn!(error = %e, "reload failed, previous snapshot stays live");
                Err(e)
            }
        }
    }

    /// Whether the live source reports new data. `false` while a reload is
    /// in flight.
    ///
    /// # Errors
    /// Returns an error if the source cannot be inspected.
    pub fn has_new_data(&self) -> Result<bool> {
        match self.source.try_lock() {
            Some(mut guard) => match guard.as_mut() {
                Some(source) => source.has_new_data(),
                None => Ok(false),
            },
            None => Ok(false),
        }
    }

    fn load_candidate(&self, origin: &str) -> Result<Snapshot> {
        let mut candidate = ArchiveSource::open(origin, self.options.fetch_timeout)?;
        let loaded = candidate.load();
        candidate.close();
        loaded
    }

    /// Diff the archive at `origin` against the live snapshot
    ///
    /// # Errors
    /// Returns an error if the candidate cannot be loaded.
    pub fn compare(&self, origin: &str) -> Result<Vec<DiffEntry>> {
        let candidate = self.load_candidate(origin)?;
        Ok(diff::compare(&self.snapshot(), &candidate))
    }

    /// Diff another data source against the live snapshot
    ///
    /// # Errors
    /// Returns an error if the candidate cannot be loaded.
    pub fn compare_source(&self, candidate: &mut dyn DataSource) -> Result<Vec<DiffEntry>> {
        let snapshot = candidate.load()?;
        Ok(diff::compare(&self.snapshot(), &snapshot))
    }

    /// Apply the archive at `origin` to the live source.
    ///
    /// # Errors
    /// Returns an error if the candidate cannot be loaded, the update
    /// cannot be applied or the follow-up reload fails.
    pub fn update(&self, origin: &str) -> Result<Vec<DiffEntry>> {
        let candidate = self.load_candidate(origin)?;
        self.apply_candidate(candidate, Some(origin.to_string()))
    }

    /// Apply another data source's dataset to the live source.
    ///
    /// # Errors
    /// As for [`Self::update`].
    pub fn update_from(&self, candidate: &mut dyn DataSource) -> Result<Vec<DiffEntry>> {
        let snapshot = candidate.load()?;
        self.apply_candidate(snapshot, None)
    }

    /// Diff, stamp, apply, reload, persist. Holds the reload lock
    /// throughout so no reload interleaves with the write.
    fn apply_candidate(
        &self,
        candidate: Snapshot,
        origin: Option<String>,
    ) -> Result<Vec<DiffEntry>> {
        let mut guard = self.source.lock();

        let entries = diff::compare(&self.snapshot(), &candidate);
        if entries.is_empty() {
            tracing::info!("update carries no differences");
            return Ok(entries);
        }

        let dtstamp = Utc::now().trunc_subsecs(0);
        let update = DatasetUpdate {
            dtstamp,
            entries,
            candidate: Arc::new(candidate),
            origin,
        };

        let source = guard.as_mut().ok_or_else(|| {
            TzError::unavailable("orchestrator", "no data source is active")
        })?;
        source.apply_update(&update)?;
        tracing::info!(
            source = %source.describe(),
            entries = update.entries.len(),
            dtstamp = %format_dtstamp(dtstamp),
            "update applied"
        );

        // Record what the reload actually serves: an archive keeps its own
        // build time, a store carries the stamp just written
        let reloaded = self.reload_locked(&mut guard);
        let recorded = match reloaded {
            Ok(_) => self.snapshot().dtstamp(),
            Err(_) => dtstamp,
        };
        self.persist_sync_state(recorded, update.origin.clone());

        reloaded?;
        Ok(update.entries)
    }

    fn persist_sync_state(&self, dtstamp: DateTime<Utc>, origin: Option<String>) {
        let Some(state_dir) = &self.options.state_dir else {
            return;
        };
        let persisted = SyncState::load(state_dir).and_then(|mut state| {
            state.record_update(dtstamp, origin);
            state.save(state_dir)
        });
        if let Err(e) = persisted {
            tracing::warn!(error = %e, "failed to persist sync state");
        }
    }

    /// Release the active source
    pub fn shutdown(&self) {
        if let Some(mut source) = self.source.lock().take() {
            source.close();
        }
    }

    // Queries

    /// Zone by exact id
    ///
    /// # Errors
    /// Never fails today; kept fallible with the other queries.
    pub fn get_zone(&self, id: &str) -> Result<Option<ZoneRecord>> {
        self.counters.incr(Counter::Gets);
        let snapshot = self.snapshot();
        let found = snapshot.get(id).cloned();
        if found.is_some() {
            self.counters.incr(Counter::CacheHits);
        }
        Ok(found)
    }

    /// Zone reached through an alias's first target
    ///
    /// # Errors
    /// Never fails today; kept fallible with the other queries.
    pub fn get_aliased_zone(&self, alias: &str) -> Result<Option<ZoneRecord>> {
        self.counters.incr(Counter::Gets);
        let snapshot = self.snapshot();
        let found = snapshot
            .aliases()
            .first_target(alias)
            .and_then(|target| snapshot.get(target))
            .cloned();
        if found.is_some() {
            self.counters.incr(Counter::CacheHits);
        }
        Ok(found)
    }

    /// Canonical id for a zone id or alias
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<String> {
        self.counters.incr(Counter::AliasReads);
        self.snapshot().resolve(name).map(str::to_string)
    }

    /// Aliases pointing at `id`
    #[must_use]
    pub fn aliases_of(&self, id: &str) -> BTreeSet<String> {
        self.counters.incr(Counter::AliasReads);
        self.snapshot().aliases().aliases_of(id)
    }

    /// Alias table as loaded
    #[must_use]
    pub fn aliases_text(&self) -> String {
        self.counters.incr(Counter::AliasReads);
        self.snapshot().aliases_text().to_string()
    }

    /// All zone ids, sorted
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.counters.incr(Counter::NameLists);
        self.snapshot().ids().map(str::to_string).collect()
    }

    /// Zones whose id or aliases contain `partial`
    #[must_use]
    pub fn find_zones(&self, partial: &str) -> Vec<ZoneSummary> {
        self.counters.incr(Counter::NameLists);
        self.snapshot().find(partial)
    }

    /// Zones changed after `since` (all zones when `None`). A malformed
    /// timestamp yields `None`.
    ///
    /// # Errors
    /// Never fails today; kept fallible with the other queries.
    pub fn list_changed_since(&self, since: Option<&str>) -> Result<Option<Vec<ZoneSummary>>> {
        self.counters.incr(Counter::NameLists);
        since
            .map(|value| datetime::parse_dtstamp(value).ok_or_else(|| TzError::bad_time(value)))
            .transpose()
            .map(|since| self.snapshot().changed_since(since))
            .or_not_found()
    }

    /// Dataset timestamp of the live snapshot
    #[must_use]
    pub fn dtstamp(&self) -> DateTime<Utc> {
        self.snapshot().dtstamp()
    }

    /// Entity tag for the live dataset
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", format_dtstamp(self.dtstamp()))
    }

    /// Observance onsets of a zone in a window. Omitted bounds default to
    /// today and ten years on.
    ///
    /// # Errors
    /// Returns `InternalFault` if the expansion fails. Unknown zones and
    /// malformed bounds yield `None`.
    pub fn expand(
        &self,
        name: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Option<Arc<ExpansionResult>>> {
        let snapshot = self.snapshot();
        self.expand_in(&snapshot, name, start, end).or_not_found()
    }

    fn expand_in(
        &self,
        snapshot: &Snapshot,
        name: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Arc<ExpansionResult>> {
        let bound = |value: Option<&str>| -> Result<Option<DateTime<Utc>>> {
            value
                .map(|v| datetime::parse_window_bound(v).ok_or_else(|| TzError::bad_time(v)))
                .transpose()
        };
        let start = bound(start)?;
        let end = bound(end)?;

        let record = snapshot.resolve_record(name)?;
        let key = ExpansionKey::new(record.id.clone(), start, end, Utc::now());
        self.cache.get_or_compute(snapshot, &key, &self.counters)
    }

    /// Convert a local date-time in zone `tzid` to UTC.
    ///
    /// A value already in UTC (`YYYYMMDDTHHMMSSZ`) is returned unchanged
    /// without looking up the zone.
    ///
    /// # Errors
    /// Returns `InternalFault` if the conversion fails. Malformed input and
    /// unknown zones yield `None`.
    pub fn local_to_utc(&self, value: &str, tzid: &str) -> Result<Option<String>> {
        let started = Instant::now();
        let result = self.local_to_utc_inner(value, tzid).or_not_found();
        self.counters
            .record(Counter::Conversions, Counter::ConversionMillis, started);
        result
    }

    fn local_to_utc_inner(&self, value: &str, tzid: &str) -> Result<String> {
        if datetime::is_utc(value) {
            return Ok(value.to_string());
        }
        let local = datetime::parse_local(value).ok_or_else(|| TzError::bad_time(value))?;
        let snapshot = self.snapshot();
        let record = snapshot.resolve_record(tzid)?;
        let utc = record
            .rules()
            .to_utc(local)
            .map_err(|e| TzError::internal(format!("convert in {}", record.id), e))?;
        Ok(datetime::format_utc(utc))
    }

    /// Convert a date-time between zones. A UTC-suffixed input ignores
    /// `from_tzid`.
    ///
    /// # Errors
    /// Returns `InternalFault` if the conversion fails. Malformed input and
    /// unknown zones yield `None`.
    pub fn convert(&self, value: &str, from_tzid: &str, to_tzid: &str) -> Result<Option<String>> {
        let started = Instant::now();
        let result = self.convert_inner(value, from_tzid, to_tzid).or_not_found();
        self.counters
            .record(Counter::Conversions, Counter::ConversionMillis, started);
        result
    }

    fn convert_inner(&self, value: &str, from_tzid: &str, to_tzid: &str) -> Result<String> {
        let snapshot = self.snapshot();

        let instant = match datetime::parse_utc(value) {
            Some(instant) => instant,
            None => {
                let local =
                    datetime::parse_local(value).ok_or_else(|| TzError::bad_time(value))?;
                let from = snapshot.resolve_record(from_tzid)?;
                from.rules()
                    .to_utc(local)
                    .map_err(|e| TzError::internal(format!("convert in {}", from.id), e))?
            }
        };

        let to = snapshot.resolve_record(to_tzid)?;
        let local = to
            .rules()
            .to_local(instant)
            .map_err(|e| TzError::internal(format!("convert to {}", to.id), e))?;
        Ok(datetime::format_local(local))
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(source) = self.source.get_mut().as_mut() {
            source.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SourceKind;
    use crate::snapshot::tests::snapshot;

    /// In-memory source serving a fixed sequence of snapshots
    struct FixedSource {
        snapshots: Vec<Snapshot>,
        loads: usize,
    }

    impl DataSource for FixedSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Archive
        }

        fn describe(&self) -> String {
            "fixed".to_string()
        }

        fn load(&mut self) -> Result<Snapshot> {
            let snapshot = self
                .snapshots
                .get(self.loads)
                .cloned()
                .ok_or_else(|| TzError::unavailable("fixed", "exhausted"))?;
            self.loads += 1;
            Ok(snapshot)
        }

        fn has_new_data(&mut self) -> Result<bool> {
            Ok(self.loads < self.snapshots.len())
        }

        fn apply_update(&mut self, _update: &DatasetUpdate) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn started(snapshots: Vec<Snapshot>) -> Orchestrator {
        let orchestrator = Orchestrator::new(OrchestratorOptions::default());
        let constructor: SourceConstructor = Box::new(move || {
            Ok(Box::new(FixedSource { snapshots, loads: 0 }) as Box<dyn DataSource>)
        });
        assert_eq!(orchestrator.start(vec![constructor]), State::Ready);
        orchestrator
    }

    /// Source that reports when it is closed
    struct ClosingSource {
        closed: Arc<AtomicBool>,
    }

    impl DataSource for ClosingSource {
        fn kind(&self) -> SourceKind {
            SourceKind::Archive
        }

        fn describe(&self) -> String {
            "closing".to_string()
        }

        fn load(&mut self) -> Result<Snapshot> {
            Ok(snapshot(&[("A", "+0100")], ""))
        }

        fn has_new_data(&mut self) -> Result<bool> {
            Ok(false)
        }

        fn apply_update(&mut self, _update: &DatasetUpdate) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn closing(closed: &Arc<AtomicBool>) -> SourceConstructor {
        let closed = Arc::clone(closed);
        Box::new(move || Ok(Box::new(ClosingSource { closed }) as Box<dyn DataSource>))
    }

    #[test]
    fn test_restart_closes_previous_source() {
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));

        let orchestrator = Orchestrator::new(OrchestratorOptions::default());
        assert_eq!(orchestrator.start(vec![closing(&first)]), State::Ready);
        assert!(!first.load(Ordering::SeqCst));

        assert_eq!(orchestrator.start(vec![closing(&second)]), State::Ready);
        assert!(first.load(Ordering::SeqCst));
        assert!(!second.load(Ordering::SeqCst));
        assert_eq!(orchestrator.snapshot().generation(), 2);

        orchestrator.shutdown();
        assert!(second.load(Ordering::SeqCst));
    }

    #[test]
    fn test_failed_start_serves_empty_snapshot() {
        let orchestrator = Orchestrator::new(OrchestratorOptions::default());
        assert_eq!(orchestrator.state(), State::Uninitialized);

        let failing: SourceConstructor =
            Box::new(|| Err(TzError::unavailable("nowhere", "not configured")));
        assert_eq!(orchestrator.start(vec![failing]), State::Failed);
        assert!(orchestrator.snapshot().is_empty());
        assert_eq!(orchestrator.snapshot().kind(), SourceKind::Empty);
        assert!(orchestrator.reload().is_err());
        assert_eq!(orchestrator.state(), State::Failed);
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let orchestrator = started(vec![snapshot(&[("A", "+0100")], "")]);
        let before = orchestrator.snapshot();

        assert!(orchestrator.reload().is_err());
        assert_eq!(orchestrator.state(), State::Ready);
        assert!(Arc::ptr_eq(&before, &orchestrator.snapshot()));
    }

    #[test]
    fn test_reload_bumps_generation() {
        let orchestrator = started(vec![
            snapshot(&[("A", "+0100")], ""),
            snapshot(&[("A", "+0100"), ("B", "+0200")], ""),
        ]);
        assert_eq!(orchestrator.snapshot().generation(), 1);
        assert!(orchestrator.has_new_data().unwrap());

        let outcome = orchestrator.reload().unwrap();
        assert_eq!(
            outcome,
            ReloadOutcome::Reloaded {
                zones: 2,
                generation: 2
            }
        );
        assert_eq!(orchestrator.counters().get(Counter::Reloads), 2);
        assert!(!orchestrator.has_new_data().unwrap());
    }

    #[test]
    fn test_queries_and_counters() {
        let orchestrator = started(vec![snapshot(
            &[("America/New_York", "-0500"), ("Asia/Kolkata", "+0530")],
            "US/Eastern=America/New_York\n",
        )]);

        assert!(orchestrator.get_zone("Asia/Kolkata").unwrap().is_some());
        assert!(orchestrator.get_zone("Mars/Olympus").unwrap().is_none());
        assert_eq!(orchestrator.counters().get(Counter::Gets), 2);
        assert_eq!(orchestrator.counters().get(Counter::CacheHits), 1);

        let aliased = orchestrator.get_aliased_zone("US/Eastern").unwrap().unwrap();
        assert_eq!(aliased.id, "America/New_York");
        assert!(orchestrator.get_aliased_zone("America/New_York").unwrap().is_none());

        assert_eq!(
            orchestrator.resolve("US/Eastern").as_deref(),
            Some("America/New_York")
        );
        assert_eq!(orchestrator.aliases_of("America/New_York").len(), 1);
        assert_eq!(orchestrator.names().len(), 2);
        assert_eq!(orchestrator.find_zones("kolk").len(), 1);
        assert_eq!(orchestrator.etag(), "\"2024-01-01T00:00:00Z\"");

        assert_eq!(
            orchestrator.list_changed_since(Some("2023-06-01T00:00:00Z")).unwrap().map(|z| z.len()),
            Some(2)
        );
        assert!(orchestrator.list_changed_since(Some("yesterday")).unwrap().is_none());
    }

    #[test]
    fn test_conversions() {
        let orchestrator = started(vec![snapshot(&[("Asia/Kolkata", "+0530")], "")]);

        assert_eq!(
            orchestrator
                .local_to_utc("20240101T120000", "Asia/Kolkata")
                .unwrap()
                .as_deref(),
            Some("20240101T063000Z")
        );
        // UTC input passes through even for an unknown zone
        assert_eq!(
            orchestrator
                .local_to_utc("20240101T120000Z", "Mars/Olympus")
                .unwrap()
                .as_deref(),
            Some("20240101T120000Z")
        );
        assert!(orchestrator.local_to_utc("noon", "Asia/Kolkata").unwrap().is_none());
        assert!(orchestrator
            .local_to_utc("20240101T120000", "Mars/Olympus")
            .unwrap()
            .is_none());

        assert_eq!(
            orchestrator
                .convert("20240101T063000Z", "ignored", "Asia/Kolkata")
                .unwrap()
                .as_deref(),
            Some("20240101T120000")
        );
        assert_eq!(orchestrator.counters().get(Counter::Conversions), 5);
    }

    #[test]
    fn test_expand_resolves_aliases_and_rejects_bad_bounds() {
        let orchestrator = started(vec![snapshot(&[("X", "+0100")], "Alias=X\n")]);

        let direct = orchestrator.expand("X", Some("19690101"), Some("19710101")).unwrap().unwrap();
        let aliased = orchestrator
            .expand("Alias", Some("19690101"), Some("19710101"))
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&direct, &aliased));
        assert_eq!(direct.tzid, "X");
        assert_eq!(direct.observances.len(), 1);

        assert!(orchestrator.expand("X", Some("soon"), None).unwrap().is_none());
        assert!(orchestrator.expand("Missing", None, None).unwrap().is_none());
    }
}
