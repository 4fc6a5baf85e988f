//! # Known Slugs
//!
//! A read-only snapshot of every slug and alias claimed in the current
//! batch, the artifact ids records declare, plus the slugs and aliases of
//! previously published artifacts.
//! It is built once per run, before any record is validated, and then
//! shared by reference with the validator.

use std::collections::{BTreeMap, BTreeSet};

use artifact_core::ArtifactId;

use crate::raw::RawRecord;

/// Batch-wide registry of names (slugs and aliases) and who claims them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownSlugs {
    /// Name → keys of the records in this batch that claim it.
    claims: BTreeMap<String, BTreeSet<String>>,
    /// Declared id → keys of the records in this batch that carry it.
    ids: BTreeMap<String, BTreeSet<String>>,
    /// Name → id of the previously published artifact known by it.
    history: BTreeMap<String, ArtifactId>,
}

impl KnownSlugs {
    /// Snapshot the slug and aliases declared by every record.
    ///
    /// Values are read loosely: a record with a malformed slug still claims
    /// it, so that collisions are reported alongside the format error.
    pub fn from_records(records: &[RawRecord]) -> Self {
        let mut claims: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut ids: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in records {
            if let Some(id) = record.declared_id() {
                ids.entry(id.to_string()).or_default().insert(record.key.clone());
            }
            let names = record.declared_slug().into_iter().chain(record.declared_aliases());
            for name in names {
                claims
                    .entry(name.to_string())
                    .or_default()
                    .insert(record.key.clone());
            }
        }
        Self {
            claims,
            ids,
            history: BTreeMap::new(),
        }
    }

    /// Add previously published names and the artifact ids they belong to.
    pub fn with_history(
        mut self,
        history: impl IntoIterator<Item = (String, ArtifactId)>,
    ) -> Self {
        self.history.extend(history);
        self
    }

    /// Keys of records other than `record_key` that claim `name`.
    pub fn conflicts<'a>(
        &'a self,
        record_key: &'a str,
        name: &str,
    ) -> impl Iterator<Item = &'a str> {
        others(self.claims.get(name), record_key)
    }

    /// Keys of records other than `record_key` that declare the id `id`.
    pub fn id_conflicts<'a>(
        &'a self,
        record_key: &'a str,
        id: &str,
    ) -> impl Iterator<Item = &'a str> {
        others(self.ids.get(id), record_key)
    }

    /// The published artifact id this name belonged to, if any.
    pub fn historical_id(&self, name: &str) -> Option<&ArtifactId> {
        self.history.get(name)
    }

    /// Whether `name` is claimed in this batch or by history.
    pub fn contains(&self, name: &str) -> bool {
        self.claims.contains_key(name) || self.history.contains_key(name)
    }

    /// Number of distinct names claimed in this batch.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

fn others<'a>(
    keys: Option<&'a BTreeSet<String>>,
    record_key: &'a str,
) -> impl Iterator<Item = &'a str> {
    keys.into_iter()
        .flatten()
        .map(String::as_str)
        .filter(move |key| *key != record_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(key: &str, aliases: &[&str]) -> RawRecord {
        RawRecord::new(key, json!({ "slug": key, "aliases": aliases }))
    }

    #[test]
    fn slug_colliding_with_alias_is_a_conflict() {
        let records = vec![
            record("first-artifact-slug", &[]),
            record("second-artifact-slug", &["first-artifact-slug"]),
        ];
        let known = KnownSlugs::from_records(&records);

        let conflicts: Vec<_> = known
            .conflicts("first-artifact-slug", "first-artifact-slug")
            .collect();
        assert_eq!(conflicts, vec!["second-artifact-slug"]);
        assert_eq!(known.conflicts("second-artifact-slug", "second-artifact-slug").count(), 0);
        assert_eq!(known.len(), 2);
    }

    #[test]
    fn history_is_consulted() {
        let id = ArtifactId::new("abcdefghijkl").unwrap();
        let known = KnownSlugs::default()
            .with_history([("retired-artifact-slug".to_string(), id.clone())]);
        assert!(known.contains("retired-artifact-slug"));
        assert_eq!(known.historical_id("retired-artifact-slug"), Some(&id));
        assert!(known.is_empty());
    }

    #[test]
    fn shared_declared_id_is_a_conflict() {
        let records = vec![
            RawRecord::new("first-artifact-slug", json!({ "id": "abcdefghijkl" })),
            RawRecord::new("second-artifact-slug", json!({ "id": "abcdefghijkl" })),
            RawRecord::new("third-artifact-slug", json!({ "id": "mnopqrstuvwx" })),
        ];
        let known = KnownSlugs::from_records(&records);

        let conflicts: Vec<_> = known
            .id_conflicts("first-artifact-slug", "abcdefghijkl")
            .collect();
        assert_eq!(conflicts, vec!["second-artifact-slug"]);
        assert_eq!(known.id_conflicts("third-artifact-slug", "mnopqrstuvwx").count(), 0);
    }
}
