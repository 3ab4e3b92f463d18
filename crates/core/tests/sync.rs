//! Secondary node sync: compare and update against a primary archive

mod common;

use tzsync_core::datetime::parse_dtstamp;
use tzsync_core::source::{archive_constructor, store_constructor};
use tzsync_core::{
    ArchiveSource, DiffEntry, DiffKind, Orchestrator, OrchestratorOptions, SourceKind, State,
    StoreSource, SyncState, TzError, admin,
};

/// A store-backed node seeded from the v1 archive
fn seeded_node(dir: &std::path::Path) -> Orchestrator {
    let v1 = dir.join("v1.zip");
    common::write_v1(&v1);

    let store = dir.join("store");
    {
        let mut source = tzsync_core::ArchiveSource::open(v1.to_str().unwrap(), None).unwrap();
        let snapshot = tzsync_core::DataSource::load(&mut source).unwrap();
        let mut seed = StoreSource::open(&store).unwrap();
        seed.import(&snapshot).unwrap();
    }

    let orchestrator = Orchestrator::new(OrchestratorOptions {
        state_dir: Some(dir.join("state")),
        fetch_timeout: None,
    });
    assert_eq!(orchestrator.start(vec![store_constructor(store)]), State::Ready);
    assert_eq!(orchestrator.snapshot().kind(), SourceKind::Store);
    orchestrator
}

#[test]
fn test_compare_reports_without_applying() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = seeded_node(dir.path());
    let v2 = dir.path().join("v2.zip");
    common::write_v2(&v2);

    let diff = orchestrator.compare(v2.to_str().unwrap()).unwrap();
    let kinds: Vec<(DiffKind, &str)> = diff.iter().map(|e| (e.kind(), e.id())).collect();
    assert_eq!(
        kinds,
        vec![
            (DiffKind::Added, "Asia/Tokyo"),
            (DiffKind::Changed, "Asia/Kolkata"),
            (DiffKind::AliasChanged, "Asia/Tokyo"),
            (DiffKind::AliasChanged, "Japan"),
        ]
    );

    let lines = admin::compare_report(&orchestrator, v2.to_str().unwrap());
    assert_eq!(lines[0], "added Asia/Tokyo");

    // Nothing was applied
    assert!(orchestrator.snapshot().get("Asia/Tokyo").is_none());
    assert_eq!(orchestrator.snapshot().generation(), 1);
}

#[test]
fn test_update_applies_and_reloads() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = seeded_node(dir.path());
    let v2 = dir.path().join("v2.zip");
    common::write_v2(&v2);

    let before = orchestrator.dtstamp();
    let applied = orchestrator.update(v2.to_str().unwrap()).unwrap();
    assert_eq!(applied.len(), 4);
    assert!(applied.contains(&DiffEntry::Added {
        id: "Asia/Tokyo".to_string()
    }));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.kind(), SourceKind::Store);
    assert_eq!(snapshot.generation(), 2);
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.resolve("Japan"), Some("Asia/Tokyo"));
    assert!(snapshot.dtstamp() > before);
    assert_eq!(snapshot.get("Asia/Tokyo").unwrap().last_modified, snapshot.dtstamp());

    let changed = orchestrator
        .list_changed_since(Some(&tzsync_core::datetime::format_dtstamp(before)))
        .unwrap()
        .unwrap();
    let ids: Vec<&str> = changed.iter().map(|z| z.tzid.as_str()).collect();
    assert_eq!(ids, vec!["Asia/Kolkata", "Asia/Tokyo"]);

    let state = SyncState::load(&dir.path().join("state")).unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.dtstamp(), Some(snapshot.dtstamp()));
    assert_eq!(state.last_origin.as_deref(), v2.to_str());

    // Applying the same dataset again is a no-op
    assert!(orchestrator.update(v2.to_str().unwrap()).unwrap().is_empty());
    assert_eq!(orchestrator.snapshot().generation(), 2);
    assert_eq!(SyncState::load(&dir.path().join("state")).unwrap().version, 1);
}

#[test]
fn test_update_report_for_unreachable_origin() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = seeded_node(dir.path());

    let lines = admin::update_report(&orchestrator, dir.path().join("absent.zip").to_str().unwrap());
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("source "));
    assert_eq!(orchestrator.snapshot().generation(), 1);
}

#[test]
fn test_refresh_and_check_reports() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = seeded_node(dir.path());

    assert_eq!(admin::refresh_report(&orchestrator), admin::OK);
    assert_eq!(admin::check_report(&orchestrator), admin::OK);
    assert_eq!(orchestrator.snapshot().generation(), 3);

    let stats = admin::stats(&orchestrator);
    let reloads = stats.iter().find(|s| s.name == "tzreloads").unwrap();
    assert_eq!(reloads.value, "3");
}

/// An archive-backed node started from the v1 archive
fn archive_node(dir: &std::path::Path) -> Orchestrator {
    let v1 = dir.join("v1.zip");
    common::write_v1(&v1);

    let orchestrator = Orchestrator::new(OrchestratorOptions {
        state_dir: Some(dir.join("state")),
        fetch_timeout: None,
    });
    let constructor = archive_constructor(v1.to_str().unwrap().to_string(), None);
    assert_eq!(orchestrator.start(vec![constructor]), State::Ready);
    orchestrator
}

#[test]
fn test_archive_node_update_retargets_source() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = archive_node(dir.path());
    let v2 = dir.path().join("v2.zip");
    common::write_v2(&v2);

    let applied = orchestrator.update(v2.to_str().unwrap()).unwrap();
    assert_eq!(applied.len(), 4);

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.kind(), SourceKind::Archive);
    assert_eq!(snapshot.generation(), 2);
    assert_eq!(snapshot.resolve("Japan"), Some("Asia/Tokyo"));
    assert_eq!(
        orchestrator.source_description(),
        Some(format!("archive {}", v2.display()))
    );

    // The archive keeps its build time; sync state records what is served
    let built = parse_dtstamp("2024-06-01T00:00:00Z").unwrap();
    assert_eq!(snapshot.dtstamp(), built);
    let state = SyncState::load(&dir.path().join("state")).unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.dtstamp(), Some(built));

    // Later reloads keep reading the new origin
    orchestrator.reload().unwrap();
    assert!(orchestrator.snapshot().get("Asia/Tokyo").is_some());
}

#[test]
fn test_archive_node_rejects_source_update() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = archive_node(dir.path());
    let v2 = dir.path().join("v2.zip");
    common::write_v2(&v2);

    let mut candidate = ArchiveSource::open(v2.to_str().unwrap(), None).unwrap();
    let result = orchestrator.update_from(&mut candidate);
    tzsync_core::DataSource::close(&mut candidate);

    assert!(matches!(result, Err(TzError::SourceUnavailable { .. })));
    assert_eq!(orchestrator.snapshot().generation(), 1);
    assert!(orchestrator.snapshot().get("Asia/Tokyo").is_none());
    assert_eq!(SyncState::load(&dir.path().join("state")).unwrap().version, 0);
}

#[test]
fn test_compare_source_with_store_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = archive_node(dir.path());

    // Candidate store seeded from the v2 archive
    let v2 = dir.path().join("v2.zip");
    common::write_v2(&v2);
    let mut archive = ArchiveSource::open(v2.to_str().unwrap(), None).unwrap();
    let v2_snapshot = tzsync_core::DataSource::load(&mut archive).unwrap();
    tzsync_core::DataSource::close(&mut archive);
    let mut candidate = StoreSource::open(&dir.path().join("candidate")).unwrap();
    candidate.import(&v2_snapshot).unwrap();

    let diff = orchestrator.compare_source(&mut candidate).unwrap();
    let kinds: Vec<DiffKind> = diff.iter().map(DiffEntry::kind).collect();
    assert_eq!(
        kinds,
        vec![
            DiffKind::Added,
            DiffKind::Changed,
            DiffKind::AliasChanged,
            DiffKind::AliasChanged
        ]
    );
    assert_eq!(orchestrator.snapshot().generation(), 1);
}

#[test]
fn test_store_node_update_from_source() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = seeded_node(dir.path());
    let v2 = dir.path().join("v2.zip");
    common::write_v2(&v2);

    let mut candidate = ArchiveSource::open(v2.to_str().unwrap(), None).unwrap();
    let applied = orchestrator.update_from(&mut candidate).unwrap();
    tzsync_core::DataSource::close(&mut candidate);
    assert_eq!(applied.len(), 4);

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.kind(), SourceKind::Store);
    assert_eq!(snapshot.generation(), 2);
    assert!(snapshot.get("Asia/Tokyo").is_some());

    let state = SyncState::load(&dir.path().join("state")).unwrap();
    assert_eq!(state.version, 1);
    assert_eq!(state.dtstamp(), Some(snapshot.dtstamp()));
    assert!(state.last_origin.is_none());
}
