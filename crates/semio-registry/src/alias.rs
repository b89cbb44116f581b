//! Pure identifier merging.
//!
//! `merge` turns the identifier forms observed on stored documents plus an
//! explicit alias table into canonical application records. It does no I/O,
//! and the same observations always produce the same records.
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

use semio_core::config::{MarkerRule, RegistrySettings};
use semio_core::{ApplicationRecord, DocumentIdentity, DocumentKind, Error, Result};

#[derive(Debug, Clone)]
pub struct AliasPolicy {
    /// alias -> canonical, as configured.
    aliases: BTreeMap<String, String>,
    /// alias -> end of its alias chain.
    terminal: BTreeMap<String, String>,
    pub marker_rule: MarkerRule,
    generated: Regex,
}

impl AliasPolicy {
    /// Chains such as `a -> b -> c` are followed to their end. A chain that
    /// returns to an identifier already on it is rejected.
    pub fn new(aliases: BTreeMap<String, String>, marker_rule: MarkerRule, generated_id_pattern: &str) -> Result<Self> {
        let generated = Regex::new(generated_id_pattern)
            .map_err(|e| Error::InvalidConfig(format!("registry.generated_id_pattern: {e}")))?;
        let mut terminal = BTreeMap::new();
        for alias in aliases.keys() {
            let mut seen = BTreeSet::from([alias.as_str()]);
            let mut current = alias.as_str();
            while let Some(next) = aliases.get(current) {
                if !seen.insert(next.as_str()) {
                    return Err(Error::InvalidConfig(format!("registry.aliases: '{alias}' is part of an alias cycle")));
                }
                current = next.as_str();
            }
            terminal.insert(alias.clone(), current.to_string());
        }
        Ok(Self { aliases, terminal, marker_rule, generated })
    }

    pub fn from_settings(settings: &RegistrySettings) -> Result<Self> {
        Self::new(settings.aliases.clone(), settings.marker_rule, &settings.generated_id_pattern)
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> { &self.aliases }

    /// Where `id` ends up after following the alias table; `None` when the
    /// table does not mention it as an alias.
    pub fn terminal(&self, id: &str) -> Option<&str> { self.terminal.get(id).map(String::as_str) }

    pub fn is_generated(&self, id: &str) -> bool { self.generated.is_match(id) }
}

/// Disjoint sets over identifier strings.
#[derive(Default)]
struct Groups {
    index: BTreeMap<String, usize>,
    parent: Vec<usize>,
}

impl Groups {
    fn node(&mut self, id: &str) -> usize {
        if let Some(&i) = self.index.get(id) { return i; }
        let i = self.parent.len();
        self.parent.push(i);
        self.index.insert(id.to_string(), i);
        i
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: &str, b: &str) {
        let (a, b) = (self.node(a), self.node(b));
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb { self.parent[ra.max(rb)] = ra.min(rb); }
    }

    fn root_of(&mut self, id: &str) -> Option<usize> {
        let i = *self.index.get(id)?;
        Some(self.find(i))
    }
}

/// Merge observed identifiers into canonical application records, sorted by
/// canonical id.
///
/// The alias table pins an identifier to its target: an aliased application
/// id is never merged through its `source` marker. Canonical choice within a
/// group: the end of an alias chain, then a human-readable application id,
/// then a human-readable marker, then a generated id. Ties go to the
/// lexicographically smallest identifier.
pub fn merge(observations: &[DocumentIdentity], policy: &AliasPolicy) -> Vec<ApplicationRecord> {
    let use_markers = policy.marker_rule == MarkerRule::SharedMarker;
    let mut groups = Groups::default();
    let mut app_ids = BTreeSet::new();
    let mut markers = BTreeSet::new();

    for obs in observations {
        groups.node(&obs.application_id);
        app_ids.insert(obs.application_id.clone());
    }

    let mut targets = BTreeSet::new();
    for (alias, terminal) in &policy.terminal {
        let mentioned = groups.index.contains_key(alias) || groups.index.contains_key(terminal);
        if mentioned {
            groups.union(alias, terminal);
            targets.insert(terminal.as_str());
        }
    }

    for obs in observations {
        if !use_markers || policy.terminal(&obs.application_id).is_some() { continue; }
        if let Some(source) = obs.source.as_deref().filter(|s| !s.is_empty()) {
            groups.union(&obs.application_id, source);
            markers.insert(source.to_string());
        }
    }

    let ids: Vec<String> = groups.index.keys().cloned().collect();
    let mut members: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for id in ids {
        if let Some(root) = groups.root_of(&id) { members.entry(root).or_default().push(id); }
    }

    let rank = |id: &String| -> u8 {
        if targets.contains(id.as_str()) { 0 }
        else if policy.is_generated(id) { 3 }
        else if app_ids.contains(id) { 1 }
        else { 2 }
    };

    let mut by_root: BTreeMap<usize, ApplicationRecord> = BTreeMap::new();
    for (root, ids) in members {
        // ids come out of a BTreeMap, so min_by_key breaks rank ties lexicographically.
        let Some(canonical) = ids.iter().min_by_key(|id| rank(id)).cloned() else { continue };
        let mut record = ApplicationRecord::new(canonical.clone());
        for id in ids {
            if markers.contains(&id) { record.markers.insert(id.clone()); }
            if id != canonical { record.aliases.insert(id); }
        }
        for kind in DocumentKind::ALL { record.document_counts.insert(kind, 0); }
        by_root.insert(root, record);
    }

    for obs in observations {
        let Some(root) = groups.root_of(&obs.application_id) else { continue };
        if let Some(record) = by_root.get_mut(&root) {
            *record.document_counts.entry(obs.kind).or_insert(0) += 1;
        }
        // A pinned id whose source is another group's marker must stay out
        // of that group's source-based selection.
        let Some(source) = obs.source.as_deref().filter(|s| markers.contains(*s)) else { continue };
        let Some(owner) = groups.root_of(source) else { continue };
        if owner != root {
            if let Some(record) = by_root.get_mut(&owner) { record.excluded.insert(obs.application_id.clone()); }
        }
    }

    let mut records: Vec<ApplicationRecord> = by_root.into_values().collect();
    records.sort_by(|a, b| a.canonical_id.cmp(&b.canonical_id));
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    const OID: &str = "64f1c0ffee0000000000beef";

    fn standard() -> AliasPolicy { AliasPolicy::from_settings(&RegistrySettings::default()).unwrap() }

    fn obs(id: &str, source: Option<&str>) -> DocumentIdentity { DocumentIdentity::new(id, source, DocumentKind::Code) }

    fn with_aliases(pairs: &[(&str, &str)]) -> Result<AliasPolicy> {
        let aliases = pairs.iter().map(|(a, t)| (a.to_string(), t.to_string())).collect();
        AliasPolicy::new(aliases, MarkerRule::SharedMarker, RegistrySettings::DEFAULT_GENERATED_ID_PATTERN)
    }

    #[test]
    fn shared_marker_merges_generated_id_under_readable_one() {
        let records = merge(&[obs("rosetta_etl", None), obs(OID, Some("rosetta_etl"))], &standard());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.canonical_id, "rosetta_etl");
        assert!(r.aliases.contains(OID));
        assert!(r.markers.contains("rosetta_etl"));
        assert_eq!(r.count(DocumentKind::Code), 2);
    }

    #[test]
    fn explicit_alias_target_wins_over_readable_ids() {
        let mut aliases = BTreeMap::new();
        aliases.insert("rosetta_etl".to_string(), "rosetta_etl_v4".to_string());
        let policy = AliasPolicy::new(aliases, MarkerRule::SharedMarker, RegistrySettings::DEFAULT_GENERATED_ID_PATTERN).unwrap();
        let records = merge(&[obs("rosetta_etl", None), obs(OID, Some("rosetta_etl"))], &policy);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].canonical_id, "rosetta_etl_v4");
        assert!(records[0].answers_to("rosetta_etl"));
        assert!(records[0].answers_to(OID));
    }

    #[test]
    fn marker_rule_off_keeps_groups_apart() {
        let policy = AliasPolicy::new(BTreeMap::new(), MarkerRule::Off, RegistrySettings::DEFAULT_GENERATED_ID_PATTERN).unwrap();
        let records = merge(&[obs("rosetta_etl", None), obs(OID, Some("rosetta_etl"))], &policy);
        let ids: Vec<&str> = records.iter().map(|r| r.canonical_id.as_str()).collect();
        assert_eq!(ids, vec![OID, "rosetta_etl"]);
        assert!(records.iter().all(|r| r.markers.is_empty()));
    }

    #[test]
    fn readable_marker_beats_generated_application_id() {
        let records = merge(&[obs(OID, Some("billing"))], &standard());
        assert_eq!(records[0].canonical_id, "billing");
        assert!(records[0].aliases.contains(OID));
    }

    #[test]
    fn merge_ignores_observation_order() {
        let a = vec![obs("b_app", None), obs(OID, Some("a_app")), obs("a_app", None)];
        let mut b = a.clone();
        b.reverse();
        assert_eq!(merge(&a, &standard()), merge(&b, &standard()));
    }

    #[test]
    fn alias_entry_overrides_the_shared_marker() {
        let documents = [
            obs("rosetta_etl", None),
            obs(OID, Some("rosetta_etl")),
            obs("5f00000000000000000000aa", Some("rosetta_etl")),
            obs("billing", None),
        ];
        let records = merge(&documents, &with_aliases(&[(OID, "billing")]).unwrap());
        let ids: Vec<&str> = records.iter().map(|r| r.canonical_id.as_str()).collect();
        assert_eq!(ids, vec!["billing", "rosetta_etl"]);

        let billing = &records[0];
        assert!(billing.answers_to(OID));
        assert_eq!(billing.count(DocumentKind::Code), 2);
        assert!(billing.markers.is_empty());

        let rosetta = &records[1];
        assert!(!rosetta.answers_to(OID));
        assert!(rosetta.answers_to("5f00000000000000000000aa"));
        assert_eq!(rosetta.count(DocumentKind::Code), 2);
        assert!(rosetta.excluded.contains(OID));
        assert!(rosetta.filter(DocumentKind::Code).excluded_ids.contains(OID));
    }

    #[test]
    fn alias_chains_resolve_to_their_last_target() {
        let policy = with_aliases(&[("a_old", "b_mid"), ("b_mid", "c_new")]).unwrap();
        assert_eq!(policy.terminal("a_old"), Some("c_new"));
        assert_eq!(policy.terminal("c_new"), None);

        let records = merge(&[obs("a_old", None), obs("b_mid", None), obs("c_new", None)], &policy);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].canonical_id, "c_new");
        assert_eq!(records[0].aliases, BTreeSet::from(["a_old".to_string(), "b_mid".to_string()]));

        let only_oldest = merge(&[obs("a_old", None)], &policy);
        assert_eq!(only_oldest[0].canonical_id, "c_new");
        assert!(only_oldest[0].answers_to("a_old"));
    }

    #[test]
    fn alias_cycles_are_config_errors() {
        assert!(matches!(with_aliases(&[("a", "b"), ("b", "a")]), Err(Error::InvalidConfig(_))));
        assert!(matches!(with_aliases(&[("a", "a")]), Err(Error::InvalidConfig(_))));
        assert!(with_aliases(&[("a", "b"), ("c", "b")]).is_ok());
    }

    #[test]
    fn bad_generated_pattern_is_a_config_error() {
        assert!(matches!(AliasPolicy::new(BTreeMap::new(), MarkerRule::Off, "(unclosed"), Err(Error::InvalidConfig(_))));
    }
}
