//! Classification of store failures into domain errors.
//!
//! A failed write is matched against an ordered list of [`Rule`]s. A rule
//! matches when the failure has the rule's [`ConstraintKind`] (if it names
//! one) and its message contains every keyword, ignoring case. The first
//! matching rule decides the domain error; without a match the failure is
//! kept as [`PathError::Internal`].

use pathway_graph::{ConstraintKind, StoreError};

use crate::error::PathError;

/// One classification rule.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub kind: Option<ConstraintKind>,
    pub keywords: &'static [&'static str],
}

impl Rule {
    pub const fn new(kind: ConstraintKind, keywords: &'static [&'static str]) -> Self {
        Self {
            kind: Some(kind),
            keywords,
        }
    }

    /// A rule that matches on message text alone.
    pub const fn text(keywords: &'static [&'static str]) -> Self {
        Self {
            kind: None,
            keywords,
        }
    }

    pub fn matches(&self, err: &StoreError) -> bool {
        if let Some(kind) = self.kind {
            if err.kind() != Some(kind) {
                return false;
            }
        }
        let message = err.message().to_lowercase();
        self.keywords
            .iter()
            .all(|keyword| message.contains(&keyword.to_lowercase()))
    }
}

// ── Rules ────────────────────────────────────────────────────────

pub const DUPLICATE_TITLE: Rule = Rule::new(ConstraintKind::Unique, &["title"]);
pub const DUPLICATE_EDGE: Rule = Rule::new(ConstraintKind::Unique, &["edge"]);
pub const MISSING_EDGE_ENDPOINT: Rule = Rule::new(ConstraintKind::ForeignKey, &["insert", "edge"]);
pub const EDGE_BLOCKS_DELETE: Rule = Rule::new(ConstraintKind::ForeignKey, &["delete", "edge"]);
pub const ITEM_BLOCKS_DELETE: Rule = Rule::new(ConstraintKind::ForeignKey, &["delete", "item"]);
pub const MISSING_PROJECT: Rule =
    Rule::new(ConstraintKind::ForeignKey, &["project_point", "project_id"]);
pub const MISSING_MEMBER_POINT: Rule =
    Rule::new(ConstraintKind::ForeignKey, &["project_point", "point_id"]);
pub const EMPTY_TITLE: Rule = Rule::new(ConstraintKind::NotNull, &["point_title"]);

/// Builder over one failure: `.when(rule, make_error)` in priority order,
/// then [`finish`](Self::finish).
pub struct ConstraintTranslator {
    cause: StoreError,
    outcome: Option<PathError>,
}

impl ConstraintTranslator {
    pub fn new(cause: StoreError) -> Self {
        Self {
            cause,
            outcome: None,
        }
    }

    pub fn when(mut self, rule: &Rule, make: impl FnOnce() -> PathError) -> Self {
        if self.outcome.is_none() && rule.matches(&self.cause) {
            self.outcome = Some(make());
        }
        self
    }

    pub fn finish(self) -> PathError {
        match self.outcome {
            Some(err) => {
                tracing::debug!(code = %err.code(), cause = %self.cause, "Classified store failure");
                err
            }
            None => {
                tracing::warn!(error = %self.cause, "Unclassified store failure");
                PathError::Internal { source: self.cause }
            }
        }
    }
}
