//! Neo4j connection management and the Neo4j-backed [`GraphStore`].
//!
//! Graph model:
//! - `(:Point {id, title, summary, created_by, created_at, updated_at})`
//! - `(:Point)-[:LEADS_TO {created_at}]->(:Point)`
//! - `(:Project {id, created_by, created_at, updated_at})-[:CONTAINS]->(:Point)`
//! - `(:Item {id})-[:ATTACHED_TO {position}]->(:Point)`, owned by the item subsystem
//! - `(:Sequence {name, value})` id counters

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query, Row, Txn};

use pathway_core::{
    Edge, Neo4jSettings, NewPoint, Point, PointId, PointView, Project, ProjectId, UserId,
};

use crate::error::{ConstraintKind, Result, StoreError};
use crate::store::{EdgeStore, GraphStore, GraphTx, PointStore, ProjectStore};

/// Thread-safe Neo4j client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given settings.
    pub async fn connect(settings: &Neo4jSettings) -> Result<Self> {
        let neo_config = ConfigBuilder::default()
            .uri(&settings.uri)
            .user(&settings.user)
            .password(&settings.password)
            .max_connections(settings.max_connections as usize)
            .fetch_size(settings.fetch_size)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!(uri = %settings.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a write-only query outside any explicit transaction.
    pub async fn run(&self, query: Query) -> Result<()> {
        self.graph.run(query).await.map_err(classify)
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<Txn> {
        self.graph.start_txn().await.map_err(classify)
    }

    /// Create the uniqueness constraints the store relies on.
    pub async fn ensure_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT point_id_key IF NOT EXISTS FOR (p:Point) REQUIRE p.id IS UNIQUE",
            "CREATE CONSTRAINT point_title_key IF NOT EXISTS FOR (p:Point) REQUIRE p.title IS UNIQUE",
            "CREATE CONSTRAINT project_id_key IF NOT EXISTS FOR (p:Project) REQUIRE p.id IS UNIQUE",
            "CREATE CONSTRAINT sequence_name_key IF NOT EXISTS FOR (s:Sequence) REQUIRE s.name IS UNIQUE",
        ];
        for statement in statements {
            self.run(query(statement)).await?;
        }
        tracing::info!("Ensured Neo4j schema constraints");
        Ok(())
    }
}

/// [`GraphStore`] over Neo4j. Each transaction is a Neo4j explicit
/// transaction, so isolation follows the server's guarantees.
#[derive(Clone)]
pub struct Neo4jStore {
    client: GraphClient,
}

impl Neo4jStore {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    type Tx = Neo4jTx;

    async fn begin(&self) -> Result<Neo4jTx> {
        let txn = self.client.start_txn().await?;
        Ok(Neo4jTx { txn })
    }
}

/// An open Neo4j transaction.
pub struct Neo4jTx {
    txn: Txn,
}

impl Neo4jTx {
    pub(crate) async fn run(&mut self, q: Query) -> Result<()> {
        self.txn.run(q).await.map_err(classify)
    }

    pub(crate) async fn rows(&mut self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.txn.execute(q).await.map_err(classify)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await.map_err(classify)? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub(crate) async fn one(&mut self, q: Query) -> Result<Option<Row>> {
        Ok(self.rows(q).await?.into_iter().next())
    }

    /// Allocate the next value of a named id sequence.
    pub(crate) async fn next_id(&mut self, sequence: &str) -> Result<i64> {
        let q = query(
            "MERGE (s:Sequence {name: $name})
             ON CREATE SET s.value = 0
             SET s.value = s.value + 1
             RETURN s.value AS value",
        )
        .param("name", sequence.to_string());

        match self.one(q).await? {
            Some(row) => get(&row, "value"),
            None => Err(StoreError::Backend(format!(
                "sequence {sequence} returned no value"
            ))),
        }
    }
}

#[async_trait]
impl PointStore for Neo4jTx {
    async fn find_point(&mut self, id: PointId) -> Result<Option<Point>> {
        self.fetch_point(id).await
    }

    async fn find_point_view(&mut self, id: PointId) -> Result<Option<PointView>> {
        self.fetch_point_view(id).await
    }

    async fn exists_point(&mut self, id: PointId) -> Result<bool> {
        self.fetch_all_exist(&[id]).await
    }

    async fn exists_all_points(&mut self, ids: &[PointId]) -> Result<bool> {
        self.fetch_all_exist(ids).await
    }

    async fn insert_point(&mut self, point: &NewPoint) -> Result<Point> {
        self.create_point(point).await
    }

    async fn update_point(&mut self, point: &Point) -> Result<Point> {
        self.set_point(point).await
    }

    async fn delete_point(&mut self, id: PointId) -> Result<()> {
        self.remove_point(id).await
    }

    async fn list_points(&mut self) -> Result<Vec<Point>> {
        self.fetch_all_points().await
    }
}

#[async_trait]
impl EdgeStore for Neo4jTx {
    async fn find_edge(&mut self, origin: PointId, destination: PointId) -> Result<Option<Edge>> {
        self.fetch_edge(origin, destination).await
    }

    async fn insert_edge(&mut self, origin: PointId, destination: PointId) -> Result<Edge> {
        self.create_edge(origin, destination).await
    }

    async fn delete_edge(&mut self, origin: PointId, destination: PointId) -> Result<bool> {
        self.remove_edge(origin, destination).await
    }

    async fn exists_path_within_depth(
        &mut self,
        from: PointId,
        to: PointId,
        depth: u32,
    ) -> Result<bool> {
        self.fetch_path_exists(from, to, depth).await
    }

    async fn find_edges_touching(&mut self, ids: &[PointId]) -> Result<Vec<Edge>> {
        self.fetch_edges_touching(ids).await
    }
}

#[async_trait]
impl ProjectStore for Neo4jTx {
    async fn insert_project(&mut self, created_by: UserId) -> Result<Project> {
        self.create_project(created_by).await
    }

    async fn exists_project(&mut self, id: ProjectId) -> Result<bool> {
        self.fetch_project_exists(id).await
    }

    async fn add_point_to_project(&mut self, project: ProjectId, point: PointId) -> Result<()> {
        self.create_membership(project, point).await
    }

    async fn point_ids_of_project(&mut self, project: ProjectId) -> Result<Vec<PointId>> {
        self.fetch_project_point_ids(project).await
    }

    async fn touch_project(&mut self, project: ProjectId) -> Result<()> {
        self.set_project_updated(project).await
    }
}

#[async_trait]
impl GraphTx for Neo4jTx {
    async fn commit(self) -> Result<()> {
        self.txn.commit().await.map_err(classify)
    }

    async fn rollback(self) -> Result<()> {
        self.txn.rollback().await.map_err(classify)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Classify a driver error by its Neo4j status text.
pub(crate) fn classify(err: neo4rs::Error) -> StoreError {
    let text = err.to_string();
    match constraint_kind_of(&text) {
        Some(kind) => StoreError::Constraint {
            kind,
            message: text,
        },
        None => StoreError::Query(err),
    }
}

fn constraint_kind_of(text: &str) -> Option<ConstraintKind> {
    let lower = text.to_lowercase();
    if lower.contains("constraintvalidationfailed") || lower.contains("already exists with") {
        Some(ConstraintKind::Unique)
    } else if lower.contains("still has relationships") {
        Some(ConstraintKind::ForeignKey)
    } else if lower.contains("deadlockdetected") || lower.contains("transienterror") {
        Some(ConstraintKind::Serialization)
    } else {
        None
    }
}

/// Typed column access.
pub(crate) fn get<T>(row: &Row, field: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    row.get::<T>(field).map_err(|e| StoreError::Decode {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_status_text_maps_to_kind() {
        assert_eq!(
            constraint_kind_of(
                "Neo.ClientError.Schema.ConstraintValidationFailed: Node(12) already exists with label `Point` and property `title` = 'A'"
            ),
            Some(ConstraintKind::Unique)
        );
        assert_eq!(
            constraint_kind_of("Cannot delete node<3>, because it still has relationships."),
            Some(ConstraintKind::ForeignKey)
        );
        assert_eq!(
            constraint_kind_of("Neo.TransientError.Transaction.DeadlockDetected"),
            Some(ConstraintKind::Serialization)
        );
        assert_eq!(constraint_kind_of("Neo.ClientError.Statement.SyntaxError"), None);
    }
}
