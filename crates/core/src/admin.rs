//! Management surface
//!
//! Thin wrappers over the orchestrator that turn outcomes into report
//! strings for an operator: `"Ok"` or an error description for reloads,
//! one line per difference for compare/update.

use std::path::Path;

use crate::config::TzConfig;
use crate::datetime::format_dtstamp;
use crate::diff::DiffEntry;
use crate::error::Result;
use crate::orchestrator::{Orchestrator, ReloadOutcome};
use crate::stats::Stat;

/// Report text for a successful reload
pub const OK: &str = "Ok";

fn reload_report(outcome: Result<ReloadOutcome>) -> String {
    match outcome {
        Ok(ReloadOutcome::Reloaded { .. }) => OK.to_string(),
        Ok(ReloadOutcome::AlreadyReloading) => "Reload already in progress".to_string(),
        Err(e) => e.to_string(),
    }
}

fn diff_report(outcome: Result<Vec<DiffEntry>>) -> Vec<String> {
    match outcome {
        Ok(entries) => entries.iter().map(DiffEntry::to_short_string).collect(),
        Err(e) => vec![e.to_string()],
    }
}

/// Reload from the live source
#[must_use]
pub fn refresh_report(orchestrator: &Orchestrator) -> String {
    reload_report(orchestrator.reload())
}

/// Check the live source for new data (always reloads)
#[must_use]
pub fn check_report(orchestrator: &Orchestrator) -> String {
    reload_report(orchestrator.check())
}

/// Differences between the archive at `origin` and the live dataset
#[must_use]
pub fn compare_report(orchestrator: &Orchestrator, origin: &str) -> Vec<String> {
    diff_report(orchestrator.compare(origin))
}

/// Apply the archive at `origin`; lists what was applied
#[must_use]
pub fn update_report(orchestrator: &Orchestrator, origin: &str) -> Vec<String> {
    diff_report(orchestrator.update(origin))
}

/// Counters plus dataset and cache figures
#[must_use]
pub fn stats(orchestrator: &Orchestrator) -> Vec<Stat> {
    let snapshot = orchestrator.snapshot();
    let cache = orchestrator.cache();

    let mut stats = orchestrator.counters().stats();
    stats.push(Stat::new("state", orchestrator.state()));
    stats.push(
        Stat::new(
            "source",
            orchestrator
                .source_description()
                .unwrap_or_else(|| "none".to_string()),
        ),
    );
    stats.push(Stat::new("zones", snapshot.len()));
    stats.push(Stat::new("aliases", snapshot.aliases().len()));
    stats.push(Stat::new("dtstamp", format_dtstamp(snapshot.dtstamp())));
    stats.push(Stat::new("generation", snapshot.generation()));

    let mut cached = Stat::new("cached expansions", cache.len());
    if let Some(oldest) = cache.oldest() {
        cached = cached.with_extra(format_dtstamp(oldest));
    }
    stats.push(cached);
    stats
}

/// Read configuration; defaults when the file is missing
///
/// # Errors
/// Returns `Config` if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<TzConfig> {
    TzConfig::load(path)
}

/// Write configuration
///
/// # Errors
/// Returns `Config` if the file cannot be written.
pub fn save_config(path: &Path, config: &TzConfig) -> Result<()> {
    TzConfig::save(config, path)?;
    tracing::info!(path = %path.display(), "configuration saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TzError;
    use crate::orchestrator::OrchestratorOptions;
    use crate::source::SourceConstructor;

    #[test]
    fn test_reports_on_failed_orchestrator() {
        let orchestrator = Orchestrator::new(OrchestratorOptions::default());
        let failing: SourceConstructor =
            Box::new(|| Err(TzError::unavailable("nowhere", "missing")));
        orchestrator.start(vec![failing]);

        let report = refresh_report(&orchestrator);
        assert_ne!(report, OK);
        assert!(report.contains("no data source is active"));

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.zip");
        let lines = compare_report(&orchestrator, missing.to_str().unwrap());
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("unavailable"));
    }

    #[test]
    fn test_stats_include_dataset_figures() {
        let orchestrator = Orchestrator::new(OrchestratorOptions::default());
        let stats = stats(&orchestrator);

        let find = |name: &str| stats.iter().find(|s| s.name == name).unwrap().value.clone();
        assert_eq!(find("state"), "uninitialized");
        assert_eq!(find("zones"), "0");
        assert_eq!(find("source"), "none");
        assert_eq!(find("cached expansions"), "0");
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tzsync.toml");

        let mut config = load_config(&path).unwrap();
        config.tzdata_url = Some("/srv/tzdata.zip".into());
        save_config(&path, &config).unwrap();

        assert_eq!(load_config(&path).unwrap(), config);
    }
}
