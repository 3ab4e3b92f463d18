//! Snapshot: one immutable, internally consistent version of the dataset

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alias::AliasTable;
use crate::error::{Result, TzError};
use crate::hash::DefinitionHash;
use crate::vtimezone::ZoneRules;

/// Which kind of data source produced a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Archive,
    Store,
    /// Placeholder served before any successful load
    Empty,
}

/// A single zone definition
#[derive(Debug, Clone)]
pub struct ZoneRecord {
    /// Zone identifier, unique within its snapshot
    pub id: String,
    /// Raw VTIMEZONE text
    pub definition: Arc<str>,
    pub last_modified: DateTime<Utc>,
    pub hash: DefinitionHash,
    rules: Arc<ZoneRules>,
}

impl ZoneRecord {
    /// Parse a definition into a record.
    ///
    /// # Errors
    /// Returns `MalformedDataset` if the VTIMEZONE block does not parse.
    pub fn new(
        id: impl Into<String>,
        definition: impl Into<Arc<str>>,
        last_modified: DateTime<Utc>,
    ) -> Result<Self> {
        let id = id.into();
        let definition: Arc<str> = definition.into();
        let rules = ZoneRules::parse(&definition).map_err(|reason| TzError::malformed(&id, reason))?;

        Ok(Self {
            hash: DefinitionHash::of_definition(&definition),
            id,
            definition,
            last_modified,
            rules: Arc::new(rules),
        })
    }

    /// Parsed recurrence rules
    #[must_use]
    pub fn rules(&self) -> &ZoneRules {
        &self.rules
    }
}

/// Summary information for listing and search results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneSummary {
    pub tzid: String,
    pub last_modified: DateTime<Utc>,
    pub aliases: Vec<String>,
}

/// Outcome of resolving a name against a snapshot
#[derive(Debug, Clone, Copy)]
pub enum AliasLookup<'a> {
    /// The name is a zone id
    Direct(&'a ZoneRecord),
    /// The name is an alias whose first target exists
    Alias(&'a ZoneRecord),
    /// The name is an alias, but its first target is not in the snapshot
    Dangling { target: &'a str },
    NotFound,
}

/// A point-in-time view of the whole dataset
#[derive(Debug, Clone)]
pub struct Snapshot {
    zones: BTreeMap<String, ZoneRecord>,
    aliases: AliasTable,
    aliases_text: String,
    dtstamp: DateTime<Utc>,
    kind: SourceKind,
    generation: u64,
}

impl Snapshot {
    /// Build a snapshot from parsed records.
    ///
    /// # Errors
    /// Returns `MalformedDataset` if two records share an id.
    pub fn new(
        records: Vec<ZoneRecord>,
        aliases: AliasTable,
        aliases_text: String,
        dtstamp: DateTime<Utc>,
        kind: SourceKind,
    ) -> Result<Self> {
        let mut zones = BTreeMap::new();
        for record in records {
            let id = record.id.clone();
            if zones.insert(id.clone(), record).is_some() {
                return Err(TzError::malformed(id, "duplicate zone id"));
            }
        }

        Ok(Self {
            zones,
            aliases,
            aliases_text,
            dtstamp,
            kind,
            generation: 0,
        })
    }

    /// Create an empty snapshot
    #[must_use]
    pub fn empty() -> Self {
        Self {
            zones: BTreeMap::new(),
            aliases: AliasTable::default(),
            aliases_text: String::new(),
            dtstamp: DateTime::<Utc>::default(),
            kind: SourceKind::Empty,
            generation: 0,
        }
    }

    /// Stamp the install generation (set once, by the orchestrator)
    #[must_use]
    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Install generation; 0 for snapshots never installed
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn dtstamp(&self) -> DateTime<Utc> {
        self.dtstamp
    }

    #[must_use]
    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    #[must_use]
    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Alias table as originally supplied
    #[must_use]
    pub fn aliases_text(&self) -> &str {
        &self.aliases_text
    }

    /// Get the number of zones
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Get a zone by exact id
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ZoneRecord> {
        self.zones.get(id)
    }

    /// Iterate zones in id order
    pub fn zones(&self) -> impl Iterator<Item = &ZoneRecord> {
        self.zones.values()
    }

    /// Zone ids in order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    /// Resolve a name: a direct zone id wins over an alias of the same name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> AliasLookup<'_> {
        if let Some(record) = self.zones.get(name) {
            return AliasLookup::Direct(record);
        }
        match self.aliases.first_target(name) {
            Some(target) => match self.zones.get(target) {
                Some(record) => AliasLookup::Alias(record),
                None => AliasLookup::Dangling { target },
            },
            None => AliasLookup::NotFound,
        }
    }

    /// Canonical id for a name, or `None` when unknown.
    ///
    /// A dangling alias still resolves to its (missing) target id.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        match self.lookup(name) {
            AliasLookup::Direct(record) | AliasLookup::Alias(record) => Some(&record.id),
            AliasLookup::Dangling { target } => Some(target),
            AliasLookup::NotFound => None,
        }
    }

    /// Resolve a name to a record present in this snapshot
    ///
    /// # Errors
    /// Returns `UnknownZone` if the name does not lead to a zone.
    pub fn resolve_record(&self, name: &str) -> Result<&ZoneRecord> {
        match self.lookup(name) {
            AliasLookup::Direct(record) | AliasLookup::Alias(record) => Ok(record),
            AliasLookup::Dangling { .. } | AliasLookup::NotFound => {
                Err(TzError::unknown_zone(name))
            }
        }
    }

    /// Summary for one zone
    #[must_use]
    pub fn summary(&self, record: &ZoneRecord) -> ZoneSummary {
        ZoneSummary {
            tzid: record.id.clone(),
            last_modified: record.last_modified,
            aliases: self.aliases.aliases_of(&record.id).into_iter().collect(),
        }
    }

    /// Zones whose id or one of whose aliases contains `partial`
    /// (case-insensitive)
    #[must_use]
    pub fn find(&self, partial: &str) -> Vec<ZoneSummary> {
        let needle = partial.to_lowercase();
        self.zones
            .values()
            .filter(|record| {
                record.id.to_lowercase().contains(&needle)
                    || self
                        .aliases
                        .aliases_of(&record.id)
                        .iter()
                        .any(|alias| alias.to_lowercase().contains(&needle))
            })
            .map(|record| self.summary(record))
            .collect()
    }

    /// Zones modified after `since`; all zones when `since` is `None`
    #[must_use]
    pub fn changed_since(&self, since: Option<DateTime<Utc>>) -> Vec<ZoneSummary> {
        self.zones
            .values()
            .filter(|record| since.map_or(true, |since| record.last_modified > since))
            .map(|record| self.summary(record))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn fixed_zone(id: &str, offset: &str) -> String {
        format!(
            "BEGIN:VTIMEZONE\nTZID:{id}\nBEGIN:STANDARD\nTZOFFSETFROM:{offset}\nTZOFFSETTO:{offset}\nDTSTART:19700101T000000\nEND:STANDARD\nEND:VTIMEZONE\n"
        )
    }

    pub(crate) fn snapshot(zones: &[(&str, &str)], aliases: &str) -> Snapshot {
        let dtstamp = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let records = zones
            .iter()
            .map(|(id, offset)| ZoneRecord::new(*id, fixed_zone(id, offset), dtstamp).unwrap())
            .collect();
        Snapshot::new(
            records,
            AliasTable::parse(aliases),
            aliases.to_string(),
            dtstamp,
            SourceKind::Archive,
        )
        .unwrap()
    }

    #[test]
    fn test_direct_hit_beats_alias() {
        let snap = snapshot(&[("A", "+0100"), ("X", "+0200")], "A=X\n");
        assert!(matches!(snap.lookup("A"), AliasLookup::Direct(r) if r.id == "A"));
        assert_eq!(snap.resolve("A"), Some("A"));
    }

    #[test]
    fn test_alias_resolution() {
        let snap = snapshot(&[("X", "+0100"), ("Y", "+0200")], "A=X,Y\nB=X\n");

        assert_eq!(snap.resolve("A"), Some("X"));
        assert_eq!(snap.resolve("B"), Some("X"));
        assert_eq!(snap.resolve("unknown"), None);
        assert!(snap.resolve_record("unknown").is_err());
    }

    #[test]
    fn test_dangling_alias_is_present_but_unresolvable() {
        let snap = snapshot(&[("X", "+0100")], "Gone=Nowhere\n");

        assert!(matches!(
            snap.lookup("Gone"),
            AliasLookup::Dangling { target: "Nowhere" }
        ));
        assert_eq!(snap.resolve("Gone"), Some("Nowhere"));
        assert!(matches!(
            snap.resolve_record("Gone"),
            Err(TzError::UnknownZone { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dtstamp = Utc::now();
        let a = ZoneRecord::new("A", fixed_zone("A", "+0100"), dtstamp).unwrap();
        let result = Snapshot::new(
            vec![a.clone(), a],
            AliasTable::default(),
            String::new(),
            dtstamp,
            SourceKind::Store,
        );
        assert!(matches!(result, Err(TzError::MalformedDataset { .. })));
    }

    #[test]
    fn test_find_matches_ids_and_aliases() {
        let snap = snapshot(
            &[("America/New_York", "-0500"), ("Europe/Paris", "+0100")],
            "US/Eastern=America/New_York\n",
        );

        let by_id = snap.find("paris");
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].tzid, "Europe/Paris");

        let by_alias = snap.find("eastern");
        assert_eq!(by_alias.len(), 1);
        assert_eq!(by_alias[0].aliases, vec!["US/Eastern".to_string()]);
    }

    #[test]
    fn test_changed_since() {
        let snap = snapshot(&[("A", "+0100"), ("B", "+0200")], "");
        let before = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(snap.changed_since(None).len(), 2);
        assert_eq!(snap.changed_since(Some(before)).len(), 2);
        assert!(snap.changed_since(Some(after)).is_empty());
    }

    #[test]
    fn test_malformed_definition() {
        let result = ZoneRecord::new("Bad/Zone", "not a vtimezone", Utc::now());
        assert!(matches!(
            result,
            Err(TzError::MalformedDataset { entry, .. }) if entry == "Bad/Zone"
        ));
    }
}
