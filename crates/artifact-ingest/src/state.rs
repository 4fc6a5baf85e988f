//! # Submission Lifecycle
//!
//! ```text
//! Incomplete ──▶ Complete ──▶ PerFileVerified ──▶ Published
//!      │             │               │
//!      └─────────────┴───────────────┴──▶ Failed
//! ```
//!
//! A [`RunLedger`] records where each submission of a run stands and
//! rejects transitions that skip or reverse a step.

use std::collections::BTreeMap;
use std::fmt;

use artifact_core::Slug;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubmissionState {
    /// Lacks its id or a file digest.
    Incomplete,
    /// Has its id and every file digest.
    Complete,
    /// Every file is in the content store with a verified digest.
    PerFileVerified,
    /// Handed to the metadata publisher.
    Published,
    Failed,
}

impl SubmissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SubmissionState::*;
        match (self, next) {
            (Incomplete, Complete)
            | (Complete, PerFileVerified)
            | (PerFileVerified, Published) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
            Self::PerFileVerified => "per-file-verified",
            Self::Published => "published",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateTransitionError {
    #[error("submission {slug} cannot move from {from} to {to}")]
    Illegal {
        slug: Slug,
        from: SubmissionState,
        to: SubmissionState,
    },
    #[error("submission {0} is not tracked in this run")]
    Unknown(Slug),
}

/// Per-run record of each submission's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunLedger {
    states: BTreeMap<Slug, SubmissionState>,
    failures: BTreeMap<Slug, String>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a submission. Re-tracking resets its state.
    pub fn track(&mut self, slug: Slug, state: SubmissionState) {
        self.failures.remove(&slug);
        self.states.insert(slug, state);
    }

    pub fn state(&self, slug: &Slug) -> Option<SubmissionState> {
        self.states.get(slug).copied()
    }

    pub fn advance(
        &mut self,
        slug: &Slug,
        to: SubmissionState,
    ) -> Result<(), StateTransitionError> {
        let current = self
            .states
            .get_mut(slug)
            .ok_or_else(|| StateTransitionError::Unknown(slug.clone()))?;
        if !current.can_transition_to(to) {
            return Err(StateTransitionError::Illegal {
                slug: slug.clone(),
                from: *current,
                to,
            });
        }
        *current = to;
        Ok(())
    }

    /// Advance every tracked submission currently in `from`.
    pub fn advance_all(
        &mut self,
        from: SubmissionState,
        to: SubmissionState,
    ) -> Result<(), StateTransitionError> {
        let slugs: Vec<Slug> = self
            .states
            .iter()
            .filter(|(_, state)| **state == from)
            .map(|(slug, _)| slug.clone())
            .collect();
        for slug in &slugs {
            self.advance(slug, to)?;
        }
        Ok(())
    }

    /// Mark every non-terminal submission failed.
    pub fn fail_pending(&mut self, reason: &str) {
        for (slug, state) in &mut self.states {
            if !state.is_terminal() {
                *state = SubmissionState::Failed;
                self.failures.insert(slug.clone(), reason.to_string());
            }
        }
    }

    pub fn failure(&self, slug: &Slug) -> Option<&str> {
        self.failures.get(slug).map(String::as_str)
    }

    /// Number of submissions in `state`.
    pub fn count(&self, state: SubmissionState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Slug, SubmissionState)> {
        self.states.iter().map(|(slug, state)| (slug, *state))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
