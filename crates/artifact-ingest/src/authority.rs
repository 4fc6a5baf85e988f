//! Identifier authorities: where existing artifact ids come from.
//!
//! An id is generated once per slug and never regenerated. Before assigning
//! a fresh id, the completer asks the authority whether the slug (or any of
//! its aliases) already has one.

use std::collections::BTreeMap;
use std::path::Path;

use artifact_core::{ArtifactId, Slug};

use crate::error::IngestError;
use crate::publish::{Artifact, ArtifactListing};

pub trait IdentifierAuthority: Send + Sync {
    /// The id already recorded for `slug`, or for the first of `aliases`
    /// that has one.
    fn existing_id(&self, slug: &Slug, aliases: &[Slug]) -> Option<ArtifactId>;

    /// Every name the authority knows, with the id it maps to.
    fn known_names(&self) -> Vec<(String, ArtifactId)> {
        Vec::new()
    }
}

/// No history: every submission without an id gets a fresh one.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl IdentifierAuthority for NoHistory {
    fn existing_id(&self, _slug: &Slug, _aliases: &[Slug]) -> Option<ArtifactId> {
        None
    }
}

/// History from a previously published listing. Every slug and alias maps
/// to the id of the artifact it named.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingAuthority {
    names: BTreeMap<String, ArtifactId>,
}

impl ListingAuthority {
    pub fn from_artifacts<'a>(artifacts: impl IntoIterator<Item = &'a Artifact>) -> Self {
        let names = artifacts
            .into_iter()
            .flat_map(|a| a.names().map(move |name| (name.to_string(), a.id.clone())))
            .collect();
        Self { names }
    }

    pub fn from_listing(listing: &ArtifactListing) -> Self {
        let mut authority = Self::from_artifacts(&listing.artifacts);
        for (name, id) in &listing.slugs {
            authority.names.entry(name.clone()).or_insert_with(|| id.clone());
        }
        authority
    }

    /// Load the listing at `path`. A missing file means no history.
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No artifact listing yet");
            return Ok(Self::default());
        }
        let listing = ArtifactListing::load(path)?;
        let authority = Self::from_listing(&listing);
        tracing::info!(
            path = %path.display(),
            artifacts = listing.artifacts.len(),
            names = authority.len(),
            "Loaded artifact history"
        );
        Ok(authority)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl IdentifierAuthority for ListingAuthority {
    fn existing_id(&self, slug: &Slug, aliases: &[Slug]) -> Option<ArtifactId> {
        std::iter::once(slug)
            .chain(aliases)
            .find_map(|name| self.names.get(name.as_str()))
            .cloned()
    }

    fn known_names(&self) -> Vec<(String, ArtifactId)> {
        self.names
            .iter()
            .map(|(name, id)| (name.clone(), id.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slug(s: &str) -> Slug {
        Slug::new(s).unwrap()
    }

    fn id(s: &str) -> ArtifactId {
        ArtifactId::new(s).unwrap()
    }

    fn listing() -> ArtifactListing {
        let mut slugs = BTreeMap::new();
        slugs.insert("renamed-artifact".to_string(), id("aaaaaaaaaaaa"));
        slugs.insert("original-slug-name".to_string(), id("aaaaaaaaaaaa"));
        ArtifactListing {
            version: 2,
            artifacts: vec![],
            slugs,
        }
    }

    #[test]
    fn slug_is_looked_up_before_aliases() {
        let authority = ListingAuthority::from_listing(&listing());
        assert_eq!(
            authority.existing_id(&slug("renamed-artifact"), &[]),
            Some(id("aaaaaaaaaaaa"))
        );
        assert_eq!(
            authority.existing_id(&slug("brand-new-slug"), &[slug("original-slug-name")]),
            Some(id("aaaaaaaaaaaa"))
        );
        assert_eq!(authority.existing_id(&slug("brand-new-slug"), &[]), None);
    }

    #[test]
    fn missing_listing_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        let authority = ListingAuthority::load(&dir.path().join("absent.json")).unwrap();
        assert!(authority.is_empty());
    }

    #[test]
    fn no_history_knows_nothing() {
        assert!(NoHistory.existing_id(&slug("renamed-artifact"), &[]).is_none());
        assert!(NoHistory.known_names().is_empty());
    }
}
