//! Snapshot comparison
//!
//! Compares a live snapshot against a candidate and reports what an update
//! would add, change or remove. Zone entries are matched by id and compared
//! by definition hash; alias changes are reported independently.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::alias::AliasTable;
use crate::snapshot::Snapshot;

/// Kind of difference, in reporting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Changed,
    Removed,
    AliasChanged,
}

/// One difference between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffEntry {
    /// Zone present only in the candidate
    Added { id: String },
    /// Zone present in both with a different definition
    Changed { id: String, summary: String },
    /// Zone present only in the live snapshot
    Removed { id: String },
    /// Alias name or alias target whose mapping differs
    AliasChanged { id: String },
}

impl DiffEntry {
    #[must_use]
    pub fn kind(&self) -> DiffKind {
        match self {
            Self::Added { .. } => DiffKind::Added,
            Self::Changed { .. } => DiffKind::Changed,
            Self::Removed { .. } => DiffKind::Removed,
            Self::AliasChanged { .. } => DiffKind::AliasChanged,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Added { id }
            | Self::Changed { id, .. }
            | Self::Removed { id }
            | Self::AliasChanged { id } => id,
        }
    }

    /// One-line rendering for admin reports
    #[must_use]
    pub fn to_short_string(&self) -> String {
        match self {
            Self::Added { id } => format!("added {id}"),
            Self::Changed { id, summary } => format!("changed {id}: {summary}"),
            Self::Removed { id } => format!("removed {id}"),
            Self::AliasChanged { id } => format!("alias changed {id}"),
        }
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_short_string())
    }
}

/// Diff `live` against `candidate`.
///
/// Output is sorted by kind (added, changed, removed, alias changed), then
/// by id. An empty result means the candidate carries nothing new.
#[must_use]
pub fn compare(live: &Snapshot, candidate: &Snapshot) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    for record in candidate.zones() {
        match live.get(&record.id) {
            None => entries.push(DiffEntry::Added {
                id: record.id.clone(),
            }),
            Some(current) if current.hash != record.hash => {
                let before = current.rules().observances().len();
                let after = record.rules().observances().len();
                let summary = if before == after {
                    "definition text differs".to_string()
                } else {
                    format!("observances {before} -> {after}")
                };
                entries.push(DiffEntry::Changed {
                    id: record.id.clone(),
                    summary,
                });
            }
            Some(_) => {}
        }
    }

    for record in live.zones() {
        if candidate.get(&record.id).is_none() {
            entries.push(DiffEntry::Removed {
                id: record.id.clone(),
            });
        }
    }

    entries.extend(
        alias_changes(live.aliases(), candidate.aliases())
            .into_iter()
            .map(|id| DiffEntry::AliasChanged { id }),
    );

    entries.sort_by(|a, b| a.kind().cmp(&b.kind()).then_with(|| a.id().cmp(b.id())));
    entries
}

/// Alias names with different target lists plus target ids with different
/// alias sets
fn alias_changes(live: &AliasTable, candidate: &AliasTable) -> BTreeSet<String> {
    let mut changed = BTreeSet::new();

    let names: BTreeSet<&str> = live
        .iter()
        .chain(candidate.iter())
        .map(|(alias, _)| alias)
        .collect();
    for name in names {
        if live.targets_of(name) != candidate.targets_of(name) {
            changed.insert(name.to_string());
        }
    }

    let targets: BTreeSet<&str> = live.targets().chain(candidate.targets()).collect();
    for target in targets {
        if live.aliases_of(target) != candidate.aliases_of(target) {
            changed.insert(target.to_string());
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::snapshot;

    #[test]
    fn test_identical_snapshots() {
        let a = snapshot(&[("A", "+0100"), ("B", "+0200")], "X=A\n");
        let b = snapshot(&[("A", "+0100"), ("B", "+0200")], "X=A\n");
        assert!(compare(&a, &b).is_empty());
    }

    #[test]
    fn test_added_changed_removed() {
        let live = snapshot(&[("A", "+0100"), ("B", "+0200"), ("C", "+0300")], "");
        let candidate = snapshot(&[("A", "+0100"), ("B", "+0230"), ("D", "+0400")], "");

        let diff = compare(&live, &candidate);
        assert_eq!(
            diff,
            vec![
                DiffEntry::Added { id: "D".into() },
                DiffEntry::Changed {
                    id: "B".into(),
                    summary: "definition text differs".into()
                },
                DiffEntry::Removed { id: "C".into() },
            ]
        );
        assert_eq!(diff[1].to_short_string(), "changed B: definition text differs");
    }

    #[test]
    fn test_symmetry() {
        let a = snapshot(&[("A", "+0100"), ("B", "+0200")], "X=A\n");
        let b = snapshot(&[("B", "+0200"), ("C", "+0300")], "X=A\n");

        let forward = compare(&a, &b);
        let backward = compare(&b, &a);

        let ids = |diff: &[DiffEntry], kind: DiffKind| -> Vec<String> {
            diff.iter()
                .filter(|e| e.kind() == kind)
                .map(|e| e.id().to_string())
                .collect()
        };
        assert_eq!(ids(&forward, DiffKind::Added), ids(&backward, DiffKind::Removed));
        assert_eq!(ids(&forward, DiffKind::Removed), ids(&backward, DiffKind::Added));
        assert_eq!(
            ids(&forward, DiffKind::Changed),
            ids(&backward, DiffKind::Changed)
        );
    }

    #[test]
    fn test_alias_changes_reported_independently() {
        let live = snapshot(&[("X", "+0100"), ("Y", "+0200")], "A=X\nB=X\n");
        let candidate = snapshot(&[("X", "+0100"), ("Y", "+0200")], "A=Y\nB=X\n");

        let diff = compare(&live, &candidate);
        let changed: Vec<&str> = diff.iter().map(DiffEntry::id).collect();

        // A retargeted; X lost an alias; Y gained one. B is untouched.
        assert_eq!(changed, vec!["A", "X", "Y"]);
        assert!(diff.iter().all(|e| e.kind() == DiffKind::AliasChanged));
    }

    #[test]
    fn test_sorted_by_kind_then_id() {
        let live = snapshot(&[("M", "+0100"), ("Z", "+0100")], "Old=M\n");
        let candidate = snapshot(&[("M", "+0200"), ("B", "+0100"), ("A", "+0100")], "");

        let diff = compare(&live, &candidate);
        let order: Vec<(DiffKind, String)> =
            diff.iter().map(|e| (e.kind(), e.id().to_string())).collect();
        assert_eq!(
            order,
            vec![
                (DiffKind::Added, "A".to_string()),
                (DiffKind::Added, "B".to_string()),
                (DiffKind::Changed, "M".to_string()),
                (DiffKind::Removed, "Z".to_string()),
                (DiffKind::AliasChanged, "M".to_string()),
                (DiffKind::AliasChanged, "Old".to_string()),
            ]
        );
    }
}
