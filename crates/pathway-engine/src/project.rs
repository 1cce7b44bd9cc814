//! Project membership: creation, existence checks, and the graph view of
//! one project.

use std::sync::Arc;

use serde::Serialize;

use pathway_core::{Edge, PointId, Project, ProjectId, UserId};
use pathway_graph::{EdgeStore, GraphStore, GraphTx, ProjectStore, StoreError};

use crate::error::{PathError, Result};
use crate::translate::{self, ConstraintTranslator};

/// A project's points and every edge touching them.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectGraph {
    pub project: ProjectId,
    pub point_ids: Vec<PointId>,
    pub edges: Vec<Edge>,
}

pub struct ProjectAggregator<S> {
    store: Arc<S>,
}

impl<S: GraphStore> ProjectAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn create_project(&self, created_by: UserId) -> Result<Project> {
        let mut tx = self.store.begin().await?;
        let project = match tx.insert_project(created_by).await {
            Ok(project) => project,
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                tracing::warn!(error = %err, "Rolled back project creation");
                return Err(err.into());
            }
        };
        tx.commit().await?;

        tracing::info!(project = %project.id, user = %created_by, "Created project");
        Ok(project)
    }

    pub async fn project_graph(&self, project: ProjectId) -> Result<ProjectGraph> {
        let mut tx = self.store.begin().await?;
        let graph = load_project_graph(&mut tx, project).await;
        tx.rollback().await?;
        graph
    }
}

pub(crate) async fn ensure_project_exists<T>(tx: &mut T, project: ProjectId) -> Result<()>
where
    T: ProjectStore + ?Sized,
{
    if !tx.exists_project(project).await? {
        return Err(PathError::ProjectNotFound { project });
    }
    Ok(())
}

/// Add `point` to `project` and refresh the project's update time.
pub(crate) async fn add_point_to_project<T>(
    tx: &mut T,
    project: ProjectId,
    point: PointId,
) -> Result<()>
where
    T: ProjectStore + ?Sized,
{
    tx.add_point_to_project(project, point)
        .await
        .map_err(|err| membership_error(err, project, point))?;
    tx.touch_project(project).await?;
    Ok(())
}

pub(crate) async fn load_project_graph<T>(tx: &mut T, project: ProjectId) -> Result<ProjectGraph>
where
    T: ProjectStore + EdgeStore + ?Sized,
{
    ensure_project_exists(tx, project).await?;
    let point_ids = tx.point_ids_of_project(project).await?;
    let edges = tx.find_edges_touching(&point_ids).await?;
    Ok(ProjectGraph {
        project,
        point_ids,
        edges,
    })
}

pub(crate) fn membership_error(err: StoreError, project: ProjectId, point: PointId) -> PathError {
    ConstraintTranslator::new(err)
        .when(&translate::MISSING_PROJECT, || PathError::ProjectNotFound {
            project,
        })
        .when(&translate::MISSING_MEMBER_POINT, || PathError::PointNotFound {
            point,
        })
        .finish()
}

#[cfg(test)]
mod tests {
    use pathway_core::NewPoint;
    use pathway_graph::{MemoryGraphStore, PointStore};

    use super::*;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_project_graph_lists_members_and_edges() {
        let store = Arc::new(MemoryGraphStore::new());
        let projects = ProjectAggregator::new(Arc::clone(&store));
        let project = projects.create_project(UserId(1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let a = tx.insert_point(&NewPoint::new("A", UserId(1))).await.unwrap();
        let b = tx.insert_point(&NewPoint::new("B", UserId(1))).await.unwrap();
        let outside = tx.insert_point(&NewPoint::new("X", UserId(1))).await.unwrap();
        add_point_to_project(&mut tx, project.id, a.id).await.unwrap();
        add_point_to_project(&mut tx, project.id, b.id).await.unwrap();
        tx.insert_edge(a.id, b.id).await.unwrap();
        tx.insert_edge(outside.id, a.id).await.unwrap();
        tx.commit().await.unwrap();

        let graph = projects.project_graph(project.id).await.unwrap();
        assert_eq!(graph.point_ids, vec![a.id, b.id]);
        let pairs: Vec<_> = graph.edges.iter().map(Edge::endpoints).collect();
        assert_eq!(pairs, vec![(a.id, b.id), (outside.id, a.id)]);
    }

    #[tokio::test]
    async fn test_missing_project() {
        let store = Arc::new(MemoryGraphStore::new());
        let projects = ProjectAggregator::new(Arc::clone(&store));

        let err = projects.project_graph(ProjectId(99)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProjectNotFound);

        let mut tx = store.begin().await.unwrap();
        let point = tx.insert_point(&NewPoint::new("A", UserId(1))).await.unwrap();
        let err = add_point_to_project(&mut tx, ProjectId(99), point.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProjectNotFound);
    }

    #[tokio::test]
    async fn test_failed_project_creation_is_rolled_back() {
        let store = Arc::new(MemoryGraphStore::new());
        let projects = ProjectAggregator::new(Arc::clone(&store));
        store.inject_fault(pathway_graph::Fault::ProjectInsert {
            created_by: UserId(4),
        });

        let err = projects.create_project(UserId(4)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalServer);

        store.clear_faults();
        let project = projects.create_project(UserId(4)).await.unwrap();
        assert_ne!(project.id, ProjectId(1));
        let err = projects.project_graph(ProjectId(1)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ProjectNotFound);
    }
}
