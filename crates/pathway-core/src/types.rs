//! Core domain types for the Pathway point graph.
//!
//! Points are the nodes of a directed graph, edges connect them, and
//! projects group points through a membership relation. Identifiers are
//! numeric and assigned by the store on insert.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifiers ───────────────────────────────────────────────────

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a point (graph node).
    PointId
);
numeric_id!(
    /// Identifier of a project.
    ProjectId
);
numeric_id!(
    /// Identifier of the user who created a point or project.
    UserId
);
numeric_id!(
    /// Identifier of an item (e.g. a memo) attached to a point.
    ItemId
);

// ── Points ────────────────────────────────────────────────────────

/// A stored point.
///
/// Title and summary are the only attributes that change after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Point {
    pub id: PointId,
    pub title: String,
    pub summary: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A point as read back for display, with the ids of its attached items
/// in order. The item list is computed by the store at query time and is
/// never written back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointView {
    #[serde(flatten)]
    pub point: Point,
    pub item_ids: Vec<ItemId>,
}

/// Attributes for a point that has not been stored yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewPoint {
    pub title: String,
    pub summary: Option<String>,
    pub created_by: UserId,
}

impl NewPoint {
    pub fn new(title: impl Into<String>, created_by: UserId) -> Self {
        Self {
            title: title.into(),
            summary: None,
            created_by,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

// ── Edges ─────────────────────────────────────────────────────────

/// A directed connection from `origin` to `destination`.
///
/// At most one edge exists per ordered pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub origin: PointId,
    pub destination: PointId,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// The `(origin, destination)` pair.
    pub fn endpoints(&self) -> (PointId, PointId) {
        (self.origin, self.destination)
    }

    /// Whether `point` is either endpoint of this edge.
    pub fn touches(&self, point: PointId) -> bool {
        self.origin == point || self.destination == point
    }
}

// ── Projects ──────────────────────────────────────────────────────

/// A project. Its member points live in a separate membership relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Point Placement ───────────────────────────────────────────────

/// Which way the single edge of a [`PointPlacement::SingleEdge`] points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// existing → new
    FromExisting,
    /// new → existing
    ToExisting,
}

impl Direction {
    /// Order `(existing, new)` into `(origin, destination)`.
    pub fn orient(self, existing: PointId, new: PointId) -> (PointId, PointId) {
        match self {
            Self::FromExisting => (existing, new),
            Self::ToExisting => (new, existing),
        }
    }
}

/// Where a newly created point goes in the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PointPlacement {
    /// No edges.
    Standalone,
    /// One new edge between an existing point and the new one.
    SingleEdge {
        existing: PointId,
        direction: Direction,
    },
    /// Replace `origin → destination` with `origin → new → destination`.
    SplitEdge {
        origin: PointId,
        destination: PointId,
    },
}

impl PointPlacement {
    /// Build a placement from optional endpoints, as received from callers
    /// that express the mode through which ids are present.
    ///
    /// An origin alone means the new point follows it; a destination alone
    /// means the new point leads into it.
    pub fn from_endpoints(origin: Option<PointId>, destination: Option<PointId>) -> Self {
        match (origin, destination) {
            (None, None) => Self::Standalone,
            (Some(existing), None) => Self::SingleEdge {
                existing,
                direction: Direction::FromExisting,
            },
            (None, Some(existing)) => Self::SingleEdge {
                existing,
                direction: Direction::ToExisting,
            },
            (Some(origin), Some(destination)) => Self::SplitEdge {
                origin,
                destination,
            },
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::SingleEdge { .. } => "single_edge",
            Self::SplitEdge { .. } => "split_edge",
        }
    }
}
