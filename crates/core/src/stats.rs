//! Operational counters
//!
//! Monotonic, relaxed-ordering counters owned by one orchestrator instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Individual counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    Gets,
    CacheHits,
    NameLists,
    AliasReads,
    TzFetches,
    Reloads,
    ReloadMillis,
    ExpansionFetches,
    ExpansionHits,
    Expansions,
    ExpansionMillis,
    Conversions,
    ConversionMillis,
}

const COUNTERS: usize = 13;

impl Counter {
    fn index(self) -> usize {
        self as usize
    }
}

/// A reported statistic: name, value and an optional second figure
/// (usually accumulated milliseconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl Stat {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl ToString) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
            extra: None,
        }
    }

    #[must_use]
    pub fn with_extra(mut self, extra: impl ToString) -> Self {
        self.extra = Some(extra.to_string());
        self
    }
}

/// Counter set for one orchestrator
#[derive(Debug, Default)]
pub struct OperationalCounters {
    values: [AtomicU64; COUNTERS],
}

impl OperationalCounters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, amount: u64) {
        self.values[counter.index()].fetch_add(amount, Ordering::Relaxed);
    }

    /// Count one event and the milliseconds elapsed since `started`
    pub fn record(&self, count: Counter, millis: Counter, started: Instant) {
        self.incr(count);
        self.add(millis, started.elapsed().as_millis() as u64);
    }

    #[must_use]
    pub fn get(&self, counter: Counter) -> u64 {
        self.values[counter.index()].load(Ordering::Relaxed)
    }

    /// Counters as reportable statistics
    #[must_use]
    pub fn stats(&self) -> Vec<Stat> {
        vec![
            Stat::new("Gets", self.get(Counter::Gets)),
            Stat::new("Hits", self.get(Counter::CacheHits)),
            Stat::new("Name lists", self.get(Counter::NameLists)),
            Stat::new("Alias reads", self.get(Counter::AliasReads)),
            Stat::new("conversions", self.get(Counter::Conversions))
                .with_extra(self.get(Counter::ConversionMillis)),
            Stat::new("tzfetches", self.get(Counter::TzFetches)),
            Stat::new("tzreloads", self.get(Counter::Reloads))
                .with_extra(self.get(Counter::ReloadMillis)),
            Stat::new("expansion fetches", self.get(Counter::ExpansionFetches)),
            Stat::new("expansion hits", self.get(Counter::ExpansionHits)),
            Stat::new("expands", self.get(Counter::Expansions))
                .with_extra(self.get(Counter::ExpansionMillis)),
        ]
    }
}
