//! Alias table: many-to-many mapping between aliases and canonical zone ids
//!
//! Source text is property style, one `alias=target1,target2,...` per line.
//! One alias may fan out to several candidate ids and one id may be the
//! target of several aliases.

use std::collections::{BTreeMap, BTreeSet};

/// Bidirectional alias maps, built once per dataset load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    /// alias -> targets, in the order they were listed
    alias_to_targets: BTreeMap<String, Vec<String>>,
    /// target -> aliases referencing it
    target_to_aliases: BTreeMap<String, BTreeSet<String>>,
}

impl AliasTable {
    /// Parse alias source text.
    ///
    /// Blank lines and `#`/`!` comments are skipped, as are aliases with a
    /// blank value. A repeated alias key replaces the earlier line.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut alias_to_targets: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some((alias, value)) = line.split_once('=') else {
                continue;
            };
            let alias = alias.trim();
            let value = value.trim();
            if alias.is_empty() || value.is_empty() {
                continue;
            }

            let mut targets: Vec<String> = Vec::new();
            for id in value.split(',').map(str::trim).filter(|id| !id.is_empty()) {
                if !targets.iter().any(|t| t == id) {
                    targets.push(id.to_string());
                }
            }
            if targets.is_empty() {
                continue;
            }

            alias_to_targets.insert(alias.to_string(), targets);
        }

        Self::from_map(alias_to_targets)
    }

    /// Build from an alias -> targets map (e.g. read back from a store)
    #[must_use]
    pub fn from_map(alias_to_targets: BTreeMap<String, Vec<String>>) -> Self {
        let mut target_to_aliases: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (alias, targets) in &alias_to_targets {
            for id in targets {
                target_to_aliases
                    .entry(id.clone())
                    .or_default()
                    .insert(alias.clone());
            }
        }

        Self {
            alias_to_targets,
            target_to_aliases,
        }
    }

    /// First listed target of an alias.
    ///
    /// When an alias names several ids the first one in the source line wins.
    /// This follows the order of the alias file, not any notion of which id
    /// is "more correct".
    #[must_use]
    pub fn first_target(&self, alias: &str) -> Option<&str> {
        self.alias_to_targets
            .get(alias)
            .and_then(|targets| targets.first())
            .map(String::as_str)
    }

    /// All targets of an alias, in listed order
    #[must_use]
    pub fn targets_of(&self, alias: &str) -> Option<&[String]> {
        self.alias_to_targets.get(alias).map(Vec::as_slice)
    }

    /// Aliases referencing a canonical id (empty if none)
    #[must_use]
    pub fn aliases_of(&self, id: &str) -> BTreeSet<String> {
        self.target_to_aliases.get(id).cloned().unwrap_or_default()
    }

    /// Whether `name` is a known alias
    #[must_use]
    pub fn contains_alias(&self, name: &str) -> bool {
        self.alias_to_targets.contains_key(name)
    }

    /// Iterate over `(alias, targets)` in alias order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.alias_to_targets
            .iter()
            .map(|(alias, targets)| (alias.as_str(), targets.as_slice()))
    }

    /// All ids that appear as a target of some alias
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.target_to_aliases.keys().map(String::as_str)
    }

    /// Number of aliases
    #[must_use]
    pub fn len(&self) -> usize {
        self.alias_to_targets.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alias_to_targets.is_empty()
    }

    /// Render back to `alias=t1,t2` lines, sorted by alias
    #[must_use]
    pub fn to_source_text(&self) -> String {
        let mut out = String::new();
        for (alias, targets) in &self.alias_to_targets {
            out.push_str(alias);
            out.push('=');
            out.push_str(&targets.join(","));
            out.push('\n');
        }
        out
    }
}
