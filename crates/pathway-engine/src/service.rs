//! The graph mutation service.
//!
//! Every public operation runs in one store transaction: validation, the
//! reachability check, and all writes happen inside it, and the
//! transaction is committed only if every step succeeded. Any error rolls
//! the whole operation back.
//!
//! Operations that insert edges first take the pair locks of every pair
//! they touch and hold them until the transaction has committed.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use pathway_core::{
    Edge, GraphSettings, NewPoint, Point, PointId, PointPlacement, PointView, Project, ProjectId,
    UserId,
};
use pathway_graph::{EdgeStore, GraphStore, GraphTx, PointStore, ProjectStore, StoreError};

use crate::error::{PathError, Result};
use crate::locks::PairLocks;
use crate::project::{self, ProjectAggregator, ProjectGraph};
use crate::reachability::ReachabilityValidator;
use crate::translate::{self, ConstraintTranslator};
use crate::validate;

/// Every point and every edge in the store.
#[derive(Debug, Clone, Serialize)]
pub struct PathGraph {
    pub points: Vec<Point>,
    pub edges: Vec<Edge>,
}

pub struct GraphMutationService<S> {
    store: Arc<S>,
    validator: ReachabilityValidator,
    locks: PairLocks,
    projects: ProjectAggregator<S>,
}

impl<S: GraphStore> GraphMutationService<S> {
    pub fn new(store: S, settings: &GraphSettings) -> Self {
        let store = Arc::new(store);
        Self {
            projects: ProjectAggregator::new(Arc::clone(&store)),
            store,
            validator: ReachabilityValidator::new(settings.max_depth),
            locks: PairLocks::new(settings.lock_stripes),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn validator(&self) -> &ReachabilityValidator {
        &self.validator
    }

    pub fn projects(&self) -> &ProjectAggregator<S> {
        &self.projects
    }

    // ── Points ───────────────────────────────────────────────────

    /// Create a point in `project`, placed as `placement` says.
    #[tracing::instrument(skip(self, title), fields(op_id = %Uuid::new_v4(), mode = placement.mode_name()))]
    pub async fn create_point(
        &self,
        project: ProjectId,
        user: UserId,
        title: &str,
        placement: PointPlacement,
    ) -> Result<Point> {
        let title = validate::normalize_title(title)?;
        let pairs: Vec<(PointId, PointId)> = match placement {
            PointPlacement::SplitEdge {
                origin,
                destination,
            } => {
                validate::ensure_distinct(&[origin, destination])?;
                vec![(origin, destination)]
            }
            // The new point has no edges yet, so no existing pair can race.
            PointPlacement::Standalone | PointPlacement::SingleEdge { .. } => Vec::new(),
        };

        let _guard = self.locks.lock_pairs(&pairs).await;
        let mut tx = self.store.begin().await?;
        let outcome = self
            .create_point_in(&mut tx, project, user, &title, placement)
            .await;
        let point = finish(tx, outcome, |err| {
            create_commit_error(err, &title, project, placement)
        })
        .await?;

        tracing::info!(point = %point.id, %project, "Created point");
        Ok(point)
    }

    async fn create_point_in(
        &self,
        tx: &mut S::Tx,
        project: ProjectId,
        user: UserId,
        title: &str,
        placement: PointPlacement,
    ) -> Result<Point> {
        project::ensure_project_exists(tx, project).await?;
        let new_point = NewPoint {
            title: title.to_string(),
            summary: None,
            created_by: user,
        };

        let point = match placement {
            PointPlacement::Standalone => insert_point(tx, &new_point).await?,
            PointPlacement::SingleEdge {
                existing,
                direction,
            } => {
                if !tx.exists_point(existing).await? {
                    return Err(PathError::PointNotFound { point: existing });
                }
                let point = insert_point(tx, &new_point).await?;
                let (origin, destination) = direction.orient(existing, point.id);
                insert_edge(tx, origin, destination).await?;
                point
            }
            PointPlacement::SplitEdge {
                origin,
                destination,
            } => {
                require_points(tx, &[origin, destination]).await?;
                self.validator
                    .assert_no_cycle(tx, origin, destination)
                    .await?;
                let point = insert_point(tx, &new_point).await?;
                split_edge_in(tx, origin, destination, point.id).await?;
                point
            }
        };

        project::add_point_to_project(tx, project, point.id).await?;
        Ok(point)
    }

    /// Change the title and/or summary of a point. An empty summary
    /// clears it. The update time is refreshed either way.
    #[tracing::instrument(skip(self, title, summary), fields(op_id = %Uuid::new_v4()))]
    pub async fn update_point(
        &self,
        id: PointId,
        title: Option<&str>,
        summary: Option<&str>,
    ) -> Result<Point> {
        let title = title.map(validate::normalize_title).transpose()?;

        let mut tx = self.store.begin().await?;
        let outcome: Result<Point> = async {
            let mut point = tx
                .find_point(id)
                .await?
                .ok_or(PathError::PointNotFound { point: id })?;
            if let Some(title) = &title {
                point.title = title.clone();
            }
            if let Some(summary) = summary {
                point.summary = validate::normalize_summary(summary);
            }
            point.updated_at = Utc::now();

            let attempted = point.title.clone();
            tx.update_point(&point)
                .await
                .map_err(|err| point_write_error(err, &attempted))
        }
        .await;
        let attempted = title.unwrap_or_default();
        let point = finish(tx, outcome, |err| point_write_error(err, &attempted)).await?;

        tracing::info!(point = %point.id, "Updated point");
        Ok(point)
    }

    /// Delete a point. Fails while any edge or item references it.
    #[tracing::instrument(skip(self), fields(op_id = %Uuid::new_v4()))]
    pub async fn delete_point(&self, id: PointId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let outcome: Result<()> = async {
            if !tx.exists_point(id).await? {
                return Err(PathError::PointNotFound { point: id });
            }
            tx.delete_point(id)
                .await
                .map_err(|err| delete_error(err, id))
        }
        .await;
        finish(tx, outcome, |err| delete_error(err, id)).await?;

        tracing::info!(point = %id, "Deleted point");
        Ok(())
    }

    pub async fn get_point(&self, id: PointId) -> Result<PointView> {
        let mut tx = self.store.begin().await?;
        let view = tx.find_point_view(id).await;
        tx.rollback().await?;
        view?.ok_or(PathError::PointNotFound { point: id })
    }

    // ── Edges ────────────────────────────────────────────────────

    /// Insert `origin → destination`.
    #[tracing::instrument(skip(self), fields(op_id = %Uuid::new_v4()))]
    pub async fn connect(&self, origin: PointId, destination: PointId) -> Result<Edge> {
        validate::ensure_distinct(&[origin, destination])?;

        let _guard = self.locks.lock_pairs(&[(origin, destination)]).await;
        let mut tx = self.store.begin().await?;
        let outcome: Result<Edge> = async {
            require_points(&mut tx, &[origin, destination]).await?;
            if tx.find_edge(origin, destination).await?.is_some() {
                return Err(PathError::EdgeAlreadyExists {
                    origin,
                    destination,
                });
            }
            self.validator
                .assert_no_cycle(&mut tx, origin, destination)
                .await?;
            insert_edge(&mut tx, origin, destination).await
        }
        .await;
        let edge = finish(tx, outcome, |err| edge_write_error(err, origin, destination)).await?;

        tracing::info!(%origin, %destination, "Connected points");
        Ok(edge)
    }

    /// Remove `origin → destination`. Fails if there is no such edge.
    #[tracing::instrument(skip(self), fields(op_id = %Uuid::new_v4()))]
    pub async fn disconnect(&self, origin: PointId, destination: PointId) -> Result<()> {
        validate::ensure_distinct(&[origin, destination])?;

        let _guard = self.locks.lock_pairs(&[(origin, destination)]).await;
        let mut tx = self.store.begin().await?;
        let outcome: Result<()> = async {
            if !tx.delete_edge(origin, destination).await? {
                return Err(PathError::EdgeNotFound {
                    origin,
                    destination,
                });
            }
            Ok(())
        }
        .await;
        finish(tx, outcome, <PathError as From<StoreError>>::from).await?;

        tracing::info!(%origin, %destination, "Disconnected points");
        Ok(())
    }

    /// Replace `origin → destination` (if present) with
    /// `origin → middle → destination`.
    ///
    /// None of the three points may already lead back around the new
    /// edges within the configured depth.
    #[tracing::instrument(skip(self), fields(op_id = %Uuid::new_v4()))]
    pub async fn split_edge(
        &self,
        origin: PointId,
        destination: PointId,
        middle: PointId,
    ) -> Result<Vec<Edge>> {
        validate::ensure_distinct(&[origin, destination, middle])?;

        let pairs = [(origin, destination), (origin, middle), (middle, destination)];
        let _guard = self.locks.lock_pairs(&pairs).await;
        let mut tx = self.store.begin().await?;
        let outcome: Result<Vec<Edge>> = async {
            require_points(&mut tx, &[origin, destination, middle]).await?;
            for (from, to) in pairs {
                self.validator.assert_no_cycle(&mut tx, from, to).await?;
            }
            split_edge_in(&mut tx, origin, destination, middle).await
        }
        .await;
        let edges = finish(tx, outcome, |err| {
            edge_write_error(err, origin, destination)
        })
        .await?;

        tracing::info!(%origin, %destination, %middle, "Split edge");
        Ok(edges)
    }

    /// All points with the edges between them, read in one transaction.
    pub async fn full_graph(&self) -> Result<PathGraph> {
        let mut tx = self.store.begin().await?;
        let graph: Result<PathGraph> = async {
            let points = tx.list_points().await?;
            let ids: Vec<PointId> = points.iter().map(|p| p.id).collect();
            let edges = tx.find_edges_touching(&ids).await?;
            Ok(PathGraph { points, edges })
        }
        .await;
        tx.rollback().await?;
        graph
    }

    // ── Projects ─────────────────────────────────────────────────

    pub async fn create_project(&self, user: UserId) -> Result<Project> {
        self.projects.create_project(user).await
    }

    pub async fn project_graph(&self, project: ProjectId) -> Result<ProjectGraph> {
        self.projects.project_graph(project).await
    }
}

// ── Transaction Steps ────────────────────────────────────────────

/// Commit on success, roll back on failure.
async fn finish<Tx, T>(
    tx: Tx,
    outcome: Result<T>,
    on_commit_error: impl FnOnce(StoreError) -> PathError,
) -> Result<T>
where
    Tx: GraphTx,
{
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(on_commit_error)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            tracing::warn!(code = %err.code(), error = %err, "Rolled back mutation");
            Err(err)
        }
    }
}

async fn insert_point<Tx: GraphTx>(tx: &mut Tx, point: &NewPoint) -> Result<Point> {
    tx.insert_point(point)
        .await
        .map_err(|err| point_write_error(err, &point.title))
}

async fn insert_edge<Tx: GraphTx>(
    tx: &mut Tx,
    origin: PointId,
    destination: PointId,
) -> Result<Edge> {
    tx.insert_edge(origin, destination)
        .await
        .map_err(|err| edge_write_error(err, origin, destination))
}

/// Delete `origin → destination` if present, then insert both halves.
async fn split_edge_in<Tx: GraphTx>(
    tx: &mut Tx,
    origin: PointId,
    destination: PointId,
    middle: PointId,
) -> Result<Vec<Edge>> {
    let removed = tx.delete_edge(origin, destination).await?;
    tracing::debug!(%origin, %destination, removed, "Removed edge being split");

    let first = insert_edge(tx, origin, middle).await?;
    let second = insert_edge(tx, middle, destination).await?;
    Ok(vec![first, second])
}

/// Fail with the missing ids unless every point exists.
async fn require_points<Tx: GraphTx>(tx: &mut Tx, ids: &[PointId]) -> Result<()> {
    if tx.exists_all_points(ids).await? {
        return Ok(());
    }
    let mut missing = Vec::new();
    for &id in ids {
        if !tx.exists_point(id).await? {
            missing.push(id);
        }
    }
    Err(PathError::NonExistentPoints { points: missing })
}

// ── Error Translation ────────────────────────────────────────────

fn point_write_error(err: StoreError, title: &str) -> PathError {
    ConstraintTranslator::new(err)
        .when(&translate::DUPLICATE_TITLE, || PathError::PointNameDuplicated {
            title: title.to_string(),
        })
        .when(&translate::EMPTY_TITLE, || PathError::NullInput { field: "title" })
        .finish()
}

/// A create can lose a race with a concurrent delete or rename, which only
/// shows up when the commit re-checks constraints.
fn create_commit_error(
    err: StoreError,
    title: &str,
    project: ProjectId,
    placement: PointPlacement,
) -> PathError {
    let endpoints = match placement {
        PointPlacement::Standalone => Vec::new(),
        PointPlacement::SingleEdge { existing, .. } => vec![existing],
        PointPlacement::SplitEdge {
            origin,
            destination,
        } => vec![origin, destination],
    };
    ConstraintTranslator::new(err)
        .when(&translate::DUPLICATE_TITLE, || PathError::PointNameDuplicated {
            title: title.to_string(),
        })
        .when(&translate::MISSING_EDGE_ENDPOINT, || {
            PathError::NonExistentPoints { points: endpoints }
        })
        .when(&translate::MISSING_PROJECT, || PathError::ProjectNotFound { project })
        .finish()
}

fn edge_write_error(err: StoreError, origin: PointId, destination: PointId) -> PathError {
    ConstraintTranslator::new(err)
        .when(&translate::DUPLICATE_EDGE, || PathError::EdgeAlreadyExists {
            origin,
            destination,
        })
        .when(&translate::MISSING_EDGE_ENDPOINT, || {
            PathError::NonExistentPoints {
                points: vec![origin, destination],
            }
        })
        .finish()
}

fn delete_error(err: StoreError, point: PointId) -> PathError {
    ConstraintTranslator::new(err)
        .when(&translate::EDGE_BLOCKS_DELETE, || PathError::PointNotDeletable {
            point,
            reason: "connected by an edge",
        })
        .when(&translate::ITEM_BLOCKS_DELETE, || PathError::PointNotDeletable {
            point,
            reason: "referenced by an item",
        })
        .finish()
}
