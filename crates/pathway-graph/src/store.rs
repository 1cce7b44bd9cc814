//! Store contracts for points, edges, and project membership.
//!
//! A [`GraphStore`] hands out transactions; a [`GraphTx`] exposes every
//! read and write through the [`PointStore`], [`EdgeStore`], and
//! [`ProjectStore`] traits. Writes made through a transaction are visible
//! to that transaction immediately and to everyone else only after
//! [`GraphTx::commit`]. Dropping a transaction without committing
//! discards its writes.
//!
//! Constraint failures are reported as [`StoreError::Constraint`] with the
//! constraint names from [`crate::error`].
//!
//! [`StoreError::Constraint`]: crate::error::StoreError::Constraint

use async_trait::async_trait;

use pathway_core::{Edge, NewPoint, Point, PointId, PointView, Project, ProjectId, UserId};

use crate::error::Result;

/// Point records.
#[async_trait]
pub trait PointStore: Send {
    async fn find_point(&mut self, id: PointId) -> Result<Option<Point>>;

    /// The point together with the ids of its attached items, in order.
    async fn find_point_view(&mut self, id: PointId) -> Result<Option<PointView>>;

    async fn exists_point(&mut self, id: PointId) -> Result<bool>;

    /// Whether every id in `ids` refers to an existing point.
    async fn exists_all_points(&mut self, ids: &[PointId]) -> Result<bool>;

    /// Insert a point, assigning its id and timestamps.
    ///
    /// Fails with a unique violation on [`POINT_TITLE_KEY`] when the title
    /// is taken, and a not-null violation when it is empty.
    ///
    /// [`POINT_TITLE_KEY`]: crate::error::POINT_TITLE_KEY
    async fn insert_point(&mut self, point: &NewPoint) -> Result<Point>;

    /// Persist title, summary, and `updated_at` of an existing point.
    async fn update_point(&mut self, point: &Point) -> Result<Point>;

    /// Delete a point and its project memberships.
    ///
    /// Fails with a foreign-key violation while any edge or item still
    /// references the point.
    async fn delete_point(&mut self, id: PointId) -> Result<()>;

    /// Every point, ordered by id.
    async fn list_points(&mut self) -> Result<Vec<Point>>;
}

/// Edge records and bounded reachability.
#[async_trait]
pub trait EdgeStore: Send {
    async fn find_edge(&mut self, origin: PointId, destination: PointId) -> Result<Option<Edge>>;

    /// Insert `origin → destination`.
    ///
    /// Fails with a unique violation on [`EDGE_PAIR_KEY`] if the edge
    /// exists and a foreign-key violation if an endpoint is missing.
    ///
    /// [`EDGE_PAIR_KEY`]: crate::error::EDGE_PAIR_KEY
    async fn insert_edge(&mut self, origin: PointId, destination: PointId) -> Result<Edge>;

    /// Delete `origin → destination`. Returns whether an edge was removed.
    async fn delete_edge(&mut self, origin: PointId, destination: PointId) -> Result<bool>;

    /// Whether `to` can be reached from `from` following between 1 and
    /// `depth` edges.
    async fn exists_path_within_depth(
        &mut self,
        from: PointId,
        to: PointId,
        depth: u32,
    ) -> Result<bool>;

    /// All edges with either endpoint in `ids`.
    async fn find_edges_touching(&mut self, ids: &[PointId]) -> Result<Vec<Edge>>;
}

/// Projects and their point membership.
#[async_trait]
pub trait ProjectStore: Send {
    async fn insert_project(&mut self, created_by: UserId) -> Result<Project>;

    async fn exists_project(&mut self, id: ProjectId) -> Result<bool>;

    /// Add `point` to `project`. Fails with a foreign-key violation if
    /// either is missing.
    async fn add_point_to_project(&mut self, project: ProjectId, point: PointId) -> Result<()>;

    /// Member point ids in ascending order.
    async fn point_ids_of_project(&mut self, project: ProjectId) -> Result<Vec<PointId>>;

    /// Refresh the project's `updated_at`.
    async fn touch_project(&mut self, project: ProjectId) -> Result<()>;
}

/// A unit of work over the graph.
#[async_trait]
pub trait GraphTx: PointStore + EdgeStore + ProjectStore + Send {
    /// Publish every write made through this transaction.
    ///
    /// Constraints are re-checked against the latest committed state; on
    /// failure nothing is published.
    async fn commit(self) -> Result<()>;

    /// Discard every write made through this transaction.
    async fn rollback(self) -> Result<()>;
}

/// Source of transactions.
#[async_trait]
pub trait GraphStore: Send + Sync {
    type Tx: GraphTx;

    async fn begin(&self) -> Result<Self::Tx>;
}
