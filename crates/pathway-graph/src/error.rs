//! Low-level storage failures.
//!
//! Both backends report constraint violations with the same constraint
//! names and message shapes, so callers can classify a failure from its
//! [`ConstraintKind`] and message text without another round-trip.

use std::fmt;

/// Unique point title.
pub const POINT_TITLE_KEY: &str = "point_title_key";
/// Unique `(origin, destination)` edge pair.
pub const EDGE_PAIR_KEY: &str = "edge_origin_destination_key";
/// Edge origin must reference an existing point.
pub const EDGE_ORIGIN_FKEY: &str = "edge_origin_point_fkey";
/// Edge destination must reference an existing point.
pub const EDGE_DESTINATION_FKEY: &str = "edge_destination_point_fkey";
/// Item attachment must reference an existing point.
pub const ITEM_POINT_FKEY: &str = "item_point_id_fkey";
/// Membership must reference an existing project.
pub const MEMBERSHIP_PROJECT_FKEY: &str = "project_point_project_id_fkey";
/// Membership must reference an existing point.
pub const MEMBERSHIP_POINT_FKEY: &str = "project_point_point_id_fkey";
/// A point belongs to a project at most once.
pub const MEMBERSHIP_KEY: &str = "project_point_pkey";

/// Structured category of a constraint failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    /// The transaction could not be serialised against a concurrent one.
    Serialization,
    Other,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unique => "unique",
            Self::ForeignKey => "foreign key",
            Self::NotNull => "not null",
            Self::Serialization => "serialization",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("constraint violation ({kind}): {message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
    },

    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Failed to decode {field}: {reason}")]
    Decode { field: String, reason: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// `duplicate key value violates unique constraint "{constraint}"`.
    pub fn unique(constraint: &str, detail: impl fmt::Display) -> Self {
        Self::Constraint {
            kind: ConstraintKind::Unique,
            message: format!(
                "duplicate key value violates unique constraint \"{constraint}\" ({detail})"
            ),
        }
    }

    /// A write referencing a missing row.
    pub fn missing_reference(table: &str, constraint: &str, detail: impl fmt::Display) -> Self {
        Self::Constraint {
            kind: ConstraintKind::ForeignKey,
            message: format!(
                "insert or update on table \"{table}\" violates foreign key constraint \"{constraint}\" ({detail})"
            ),
        }
    }

    /// A delete blocked by rows that still reference the target.
    pub fn still_referenced(
        table: &str,
        constraint: &str,
        referencing_table: &str,
        detail: impl fmt::Display,
    ) -> Self {
        Self::Constraint {
            kind: ConstraintKind::ForeignKey,
            message: format!(
                "update or delete on table \"{table}\" violates foreign key constraint \"{constraint}\" on table \"{referencing_table}\" ({detail})"
            ),
        }
    }

    /// A required column left empty.
    pub fn not_null(table: &str, column: &str) -> Self {
        Self::Constraint {
            kind: ConstraintKind::NotNull,
            message: format!(
                "null value in column \"{column}\" of relation \"{table}\" violates not-null constraint"
            ),
        }
    }

    /// The structured category, if this is a constraint failure.
    pub fn kind(&self) -> Option<ConstraintKind> {
        match self {
            Self::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Full message text used for keyword classification.
    pub fn message(&self) -> String {
        match self {
            Self::Constraint { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_messages_carry_names() {
        let err = StoreError::unique(POINT_TITLE_KEY, "title = 'A'");
        assert_eq!(err.kind(), Some(ConstraintKind::Unique));
        assert!(err.message().contains("point_title_key"));

        let err = StoreError::still_referenced("point", EDGE_ORIGIN_FKEY, "edge", "point_id = 3");
        assert_eq!(err.kind(), Some(ConstraintKind::ForeignKey));
        assert!(err.message().starts_with("update or delete on table \"point\""));
        assert!(err.message().contains("on table \"edge\""));
    }

    #[test]
    fn backend_errors_have_no_kind() {
        let err = StoreError::Backend("disk full".to_string());
        assert_eq!(err.kind(), None);
        assert_eq!(err.message(), "storage backend error: disk full");
    }
}
