//! Domain errors surfaced by the graph-integrity engine.
//!
//! Every error carries one stable [`ErrorCode`] and a templated message.
//! Store failures never leave the engine raw: they are classified by
//! [`crate::translate`] or wrapped as [`PathError::Internal`].

use std::fmt;

use pathway_core::{PointId, ProjectId, UserId};
use pathway_graph::{ConstraintKind, StoreError};
use thiserror::Error;

/// Broad class of an error, used by callers to pick a response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any store access.
    Validation,
    Conflict,
    NotFound,
    Internal,
}

/// Stable machine-readable error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NullInput,
    NullPoints,
    SamePoints,
    InvalidNumericIds,
    NonExistentPoints,
    PointNotFound,
    PointNameDuplicated,
    PointNotDeletable,
    EdgeAlreadyExists,
    EdgeNotFound,
    BackwardPath,
    ProjectNotFound,
    UserNotFound,
    UserAlreadyExists,
    InternalServer,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NullInput => "NULL_INPUT",
            Self::NullPoints => "NULL_POINTS",
            Self::SamePoints => "SAME_POINTS",
            Self::InvalidNumericIds => "INVALID_NUMERIC_IDS",
            Self::NonExistentPoints => "NON_EXISTENT_POINTS",
            Self::PointNotFound => "POINT_NOT_FOUND",
            Self::PointNameDuplicated => "POINT_NAME_DUPLICATED",
            Self::PointNotDeletable => "POINT_NOT_DELETABLE",
            Self::EdgeAlreadyExists => "EDGE_ALREADY_EXISTS",
            Self::EdgeNotFound => "EDGE_NOT_FOUND",
            Self::BackwardPath => "BACKWARD_PATH",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::UserAlreadyExists => "USER_ALREADY_EXISTS",
            Self::InternalServer => "INTERNAL_SERVER",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NullInput | Self::NullPoints | Self::SamePoints | Self::InvalidNumericIds => {
                ErrorKind::Validation
            }
            Self::NonExistentPoints
            | Self::PointNameDuplicated
            | Self::PointNotDeletable
            | Self::EdgeAlreadyExists
            | Self::BackwardPath
            | Self::UserAlreadyExists => ErrorKind::Conflict,
            Self::PointNotFound | Self::EdgeNotFound | Self::ProjectNotFound | Self::UserNotFound => {
                ErrorKind::NotFound
            }
            Self::InternalServer => ErrorKind::Internal,
        }
    }

    /// HTTP status the request layer answers with.
    pub fn status(&self) -> u16 {
        match self {
            Self::NullInput
            | Self::NullPoints
            | Self::SamePoints
            | Self::InvalidNumericIds
            | Self::NonExistentPoints
            | Self::EdgeAlreadyExists => 400,
            Self::PointNotFound | Self::EdgeNotFound | Self::ProjectNotFound | Self::UserNotFound => {
                404
            }
            Self::PointNameDuplicated
            | Self::PointNotDeletable
            | Self::BackwardPath
            | Self::UserAlreadyExists => 409,
            Self::InternalServer => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Required input must not be empty - field: {field}")]
    NullInput { field: &'static str },

    #[error("Origin and destination parameters must not be null - origin: {}, destination: {}", show(.origin), show(.destination))]
    NullPoints {
        origin: Option<String>,
        destination: Option<String>,
    },

    #[error("Start point and end point cannot be the same - point: {point}")]
    SamePoints { point: PointId },

    #[error("Origin and destination must be valid numeric IDs - origin: {origin}, destination: {destination}")]
    InvalidNumericIds { origin: String, destination: String },

    #[error("Either one of the points does not exist - points: {}", join(.points))]
    NonExistentPoints { points: Vec<PointId> },

    #[error("The specified point could not be found - point: {point}")]
    PointNotFound { point: PointId },

    #[error("The provided name already exists for the point - name: {title}")]
    PointNameDuplicated { title: String },

    #[error("The point cannot be deleted while it is {reason} - point: {point}")]
    PointNotDeletable { point: PointId, reason: &'static str },

    #[error("An edge already exists between these points - origin: {origin}, destination: {destination}")]
    EdgeAlreadyExists {
        origin: PointId,
        destination: PointId,
    },

    #[error("No edge exists between these points - origin: {origin}, destination: {destination}")]
    EdgeNotFound {
        origin: PointId,
        destination: PointId,
    },

    #[error("It is a backward path from originPoint to destinationPoint within {depth} edges - origin: {origin}, destination: {destination}")]
    BackwardPath {
        depth: u32,
        origin: PointId,
        destination: PointId,
    },

    #[error("The specified project could not be found - project: {project}")]
    ProjectNotFound { project: ProjectId },

    /// Raised by the account layer that owns user records. The graph
    /// operations take user ids as given and never produce it.
    #[error("The specified user could not be found - user: {user}")]
    UserNotFound { user: UserId },

    /// Raised by the account layer, like [`PathError::UserNotFound`].
    #[error("The user already exists - user: {user}")]
    UserAlreadyExists { user: String },

    #[error("An unexpected error occurred. - {source}")]
    Internal {
        #[source]
        source: StoreError,
    },
}

impl PathError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NullInput { .. } => ErrorCode::NullInput,
            Self::NullPoints { .. } => ErrorCode::NullPoints,
            Self::SamePoints { .. } => ErrorCode::SamePoints,
            Self::InvalidNumericIds { .. } => ErrorCode::InvalidNumericIds,
            Self::NonExistentPoints { .. } => ErrorCode::NonExistentPoints,
            Self::PointNotFound { .. } => ErrorCode::PointNotFound,
            Self::PointNameDuplicated { .. } => ErrorCode::PointNameDuplicated,
            Self::PointNotDeletable { .. } => ErrorCode::PointNotDeletable,
            Self::EdgeAlreadyExists { .. } => ErrorCode::EdgeAlreadyExists,
            Self::EdgeNotFound { .. } => ErrorCode::EdgeNotFound,
            Self::BackwardPath { .. } => ErrorCode::BackwardPath,
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::UserNotFound { .. } => ErrorCode::UserNotFound,
            Self::UserAlreadyExists { .. } => ErrorCode::UserAlreadyExists,
            Self::Internal { .. } => ErrorCode::InternalServer,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    /// Whether the operation lost a race with a concurrent transaction and
    /// can be run again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Internal { source } if source.kind() == Some(ConstraintKind::Serialization)
        )
    }
}

/// Unclassified store failures become [`PathError::Internal`].
impl From<StoreError> for PathError {
    fn from(source: StoreError) -> Self {
        crate::translate::ConstraintTranslator::new(source).finish()
    }
}

pub type Result<T> = std::result::Result<T, PathError>;

fn join(points: &[PointId]) -> String {
    let parts: Vec<String> = points.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

fn show(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("null")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_path_message_is_templated() {
        let err = PathError::BackwardPath {
            depth: 5,
            origin: PointId(3),
            destination: PointId(1),
        };
        assert_eq!(err.code(), ErrorCode::BackwardPath);
        assert_eq!(err.code().status(), 409);
        assert_eq!(
            err.to_string(),
            "It is a backward path from originPoint to destinationPoint within 5 edges - origin: 3, destination: 1"
        );
    }

    #[test]
    fn non_existent_points_lists_ids() {
        let err = PathError::NonExistentPoints {
            points: vec![PointId(4), PointId(9)],
        };
        assert_eq!(
            err.to_string(),
            "Either one of the points does not exist - points: [4, 9]"
        );
    }

    #[test]
    fn null_points_shows_missing_side() {
        let err = PathError::NullPoints {
            origin: Some("1".to_string()),
            destination: None,
        };
        assert!(err.to_string().ends_with("origin: 1, destination: null"));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn internal_keeps_store_cause() {
        use std::error::Error as _;

        let err = PathError::Internal {
            source: StoreError::Backend("disk full".to_string()),
        };
        assert_eq!(err.code().as_str(), "INTERNAL_SERVER");
        assert_eq!(err.code().status(), 500);
        let cause = err.source().map(ToString::to_string);
        assert_eq!(cause.as_deref(), Some("storage backend error: disk full"));
    }

    #[test]
    fn every_code_has_one_kind() {
        assert_eq!(ErrorCode::EdgeNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(ErrorCode::EdgeAlreadyExists.kind(), ErrorKind::Conflict);
        assert_eq!(ErrorCode::InvalidNumericIds.kind(), ErrorKind::Validation);
        assert_eq!(ErrorCode::InternalServer.kind(), ErrorKind::Internal);
    }

    #[test]
    fn only_serialization_failures_are_retryable() {
        let lost_race = PathError::Internal {
            source: StoreError::Constraint {
                kind: ConstraintKind::Serialization,
                message: "DeadlockDetected".to_string(),
            },
        };
        assert!(lost_race.is_retryable());
        assert_eq!(lost_race.code(), ErrorCode::InternalServer);

        let broken = PathError::Internal {
            source: StoreError::Backend("disk full".to_string()),
        };
        assert!(!broken.is_retryable());
        assert!(!PathError::EdgeNotFound {
            origin: PointId(1),
            destination: PointId(2),
        }
        .is_retryable());
    }
}
