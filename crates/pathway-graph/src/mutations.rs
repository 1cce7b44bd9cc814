//! Write operations against Neo4j.
//!
//! Neo4j has no foreign keys, so each write first reads the references it
//! depends on and reports a missing or blocking reference with the same
//! constraint names the in-memory store uses. Title uniqueness is also
//! enforced by the `point_title_key` schema constraint. Relationships
//! cannot carry a uniqueness constraint, so an edge insert first takes
//! write locks on both endpoint nodes and holds them until commit.

use chrono::Utc;
use neo4rs::query;

use pathway_core::{Edge, NewPoint, Point, PointId, Project, ProjectId, UserId};

use crate::client::{get, Neo4jTx};
use crate::error::{
    Result, StoreError, EDGE_DESTINATION_FKEY, EDGE_ORIGIN_FKEY, EDGE_PAIR_KEY, ITEM_POINT_FKEY,
    MEMBERSHIP_KEY, MEMBERSHIP_POINT_FKEY, MEMBERSHIP_PROJECT_FKEY, POINT_TITLE_KEY,
};

const POINT_SEQUENCE: &str = "point";
const PROJECT_SEQUENCE: &str = "project";

impl Neo4jTx {
    // ── Points ───────────────────────────────────────────────────

    pub(crate) async fn create_point(&mut self, point: &NewPoint) -> Result<Point> {
        require_title(&point.title)?;
        if self.title_taken(&point.title, None).await? {
            return Err(title_conflict(&point.title));
        }

        let id = PointId(self.next_id(POINT_SEQUENCE).await?);
        let now = Utc::now();
        let q = query(
            "CREATE (p:Point {
               id: $id, title: $title, summary: $summary,
               created_by: $created_by, created_at: $now, updated_at: $now
             })",
        )
        .param("id", id.0)
        .param("title", point.title.clone())
        .param("summary", point.summary.clone().unwrap_or_default())
        .param("created_by", point.created_by.0)
        .param("now", now.to_rfc3339());
        self.run(q).await?;

        Ok(Point {
            id,
            title: point.title.clone(),
            summary: point.summary.clone(),
            created_by: point.created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub(crate) async fn set_point(&mut self, point: &Point) -> Result<Point> {
        require_title(&point.title)?;
        if self.fetch_point(point.id).await?.is_none() {
            return Err(StoreError::Backend(format!(
                "no row in table \"point\" with point_id = {}",
                point.id
            )));
        }
        if self.title_taken(&point.title, Some(point.id)).await? {
            return Err(title_conflict(&point.title));
        }

        let q = query(
            "MATCH (p:Point {id: $id})
             SET p.title = $title, p.summary = $summary, p.updated_at = $updated_at",
        )
        .param("id", point.id.0)
        .param("title", point.title.clone())
        .param("summary", point.summary.clone().unwrap_or_default())
        .param("updated_at", point.updated_at.to_rfc3339());
        self.run(q).await?;

        Ok(point.clone())
    }

    pub(crate) async fn remove_point(&mut self, id: PointId) -> Result<()> {
        let q = query(
            "MATCH (p:Point {id: $id})
             OPTIONAL MATCH (p)-[out:LEADS_TO]->()
             WITH p, count(out) AS outgoing
             OPTIONAL MATCH ()-[inc:LEADS_TO]->(p)
             WITH p, outgoing, count(inc) AS incoming
             OPTIONAL MATCH (:Item)-[att:ATTACHED_TO]->(p)
             RETURN outgoing, incoming, count(att) AS items",
        )
        .param("id", id.0);

        let Some(row) = self.one(q).await? else {
            return Ok(());
        };
        let outgoing: i64 = get(&row, "outgoing")?;
        let incoming: i64 = get(&row, "incoming")?;
        let items: i64 = get(&row, "items")?;

        let blocked = if outgoing > 0 {
            Some((EDGE_ORIGIN_FKEY, "edge"))
        } else if incoming > 0 {
            Some((EDGE_DESTINATION_FKEY, "edge"))
        } else if items > 0 {
            Some((ITEM_POINT_FKEY, "item"))
        } else {
            None
        };
        if let Some((constraint, table)) = blocked {
            return Err(StoreError::still_referenced(
                "point",
                constraint,
                table,
                format_args!("point_id = {id}"),
            ));
        }

        // Memberships go with the point.
        let q = query("MATCH (p:Point {id: $id}) DETACH DELETE p").param("id", id.0);
        self.run(q).await
    }

    async fn title_taken(&mut self, title: &str, owner: Option<PointId>) -> Result<bool> {
        let q = query(
            "MATCH (p:Point {title: $title})
             WHERE $owner IS NULL OR p.id <> $owner
             RETURN count(p) AS cnt",
        )
        .param("title", title.to_string())
        .param("owner", owner.map(|id| id.0));

        match self.one(q).await? {
            Some(row) => Ok(get::<i64>(&row, "cnt")? > 0),
            None => Ok(false),
        }
    }

    // ── Edges ────────────────────────────────────────────────────

    pub(crate) async fn create_edge(
        &mut self,
        origin: PointId,
        destination: PointId,
    ) -> Result<Edge> {
        self.lock_points(&[origin, destination]).await?;

        let q = query(
            "OPTIONAL MATCH (a:Point {id: $origin})
             OPTIONAL MATCH (b:Point {id: $destination})
             OPTIONAL MATCH (a)-[r:LEADS_TO]->(b)
             RETURN a IS NOT NULL AS has_origin,
                    b IS NOT NULL AS has_destination,
                    r IS NOT NULL AS duplicate",
        )
        .param("origin", origin.0)
        .param("destination", destination.0);

        let Some(row) = self.one(q).await? else {
            return Err(StoreError::Backend("edge precheck returned no row".to_string()));
        };
        if !get::<bool>(&row, "has_origin")? {
            return Err(StoreError::missing_reference(
                "edge",
                EDGE_ORIGIN_FKEY,
                format_args!("origin_point = {origin}"),
            ));
        }
        if !get::<bool>(&row, "has_destination")? {
            return Err(StoreError::missing_reference(
                "edge",
                EDGE_DESTINATION_FKEY,
                format_args!("destination_point = {destination}"),
            ));
        }
        if get::<bool>(&row, "duplicate")? {
            return Err(StoreError::unique(
                EDGE_PAIR_KEY,
                format_args!("{origin} -> {destination}"),
            ));
        }

        let now = Utc::now();
        let q = query(
            "MATCH (a:Point {id: $origin}), (b:Point {id: $destination})
             CREATE (a)-[:LEADS_TO {created_at: $now}]->(b)",
        )
        .param("origin", origin.0)
        .param("destination", destination.0)
        .param("now", now.to_rfc3339());
        self.run(q).await?;

        Ok(Edge {
            origin,
            destination,
            created_at: now,
        })
    }

    /// Take write locks on the given points, lowest id first, so that
    /// concurrent edge writes on the same endpoints run one after another
    /// until commit.
    async fn lock_points(&mut self, ids: &[PointId]) -> Result<()> {
        let mut ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        ids.sort_unstable();
        ids.dedup();

        let q = query(
            "UNWIND $ids AS id
             MATCH (p:Point {id: id})
             SET p._lock = true
             REMOVE p._lock",
        )
        .param("ids", ids);
        self.run(q).await
    }

    pub(crate) async fn remove_edge(
        &mut self,
        origin: PointId,
        destination: PointId,
    ) -> Result<bool> {
        let q = query(
            "OPTIONAL MATCH (:Point {id: $origin})-[r:LEADS_TO]->(:Point {id: $destination})
             WITH collect(r) AS found
             FOREACH (rel IN found | DELETE rel)
             RETURN size(found) AS removed",
        )
        .param("origin", origin.0)
        .param("destination", destination.0);

        match self.one(q).await? {
            Some(row) => Ok(get::<i64>(&row, "removed")? > 0),
            None => Ok(false),
        }
    }

    // ── Projects ─────────────────────────────────────────────────

    pub(crate) async fn create_project(&mut self, created_by: UserId) -> Result<Project> {
        let id = ProjectId(self.next_id(PROJECT_SEQUENCE).await?);
        let now = Utc::now();
        let q = query(
            "CREATE (:Project {id: $id, created_by: $created_by, created_at: $now, updated_at: $now})",
        )
        .param("id", id.0)
        .param("created_by", created_by.0)
        .param("now", now.to_rfc3339());
        self.run(q).await?;

        Ok(Project {
            id,
            created_by,
            created_at: now,
            updated_at: now,
        })
    }

    pub(crate) async fn create_membership(
        &mut self,
        project: ProjectId,
        point: PointId,
    ) -> Result<()> {
        let q = query(
            "OPTIONAL MATCH (pr:Project {id: $project})
             OPTIONAL MATCH (p:Point {id: $point})
             OPTIONAL MATCH (pr)-[c:CONTAINS]->(p)
             RETURN pr IS NOT NULL AS has_project,
                    p IS NOT NULL AS has_point,
                    c IS NOT NULL AS duplicate",
        )
        .param("project", project.0)
        .param("point", point.0);

        let Some(row) = self.one(q).await? else {
            return Err(StoreError::Backend(
                "membership precheck returned no row".to_string(),
            ));
        };
        if !get::<bool>(&row, "has_project")? {
            return Err(StoreError::missing_reference(
                "project_point",
                MEMBERSHIP_PROJECT_FKEY,
                format_args!("project_id = {project}"),
            ));
        }
        if !get::<bool>(&row, "has_point")? {
            return Err(StoreError::missing_reference(
                "project_point",
                MEMBERSHIP_POINT_FKEY,
                format_args!("point_id = {point}"),
            ));
        }
        if get::<bool>(&row, "duplicate")? {
            return Err(StoreError::unique(
                MEMBERSHIP_KEY,
                format_args!("project_id = {project}, point_id = {point}"),
            ));
        }

        let q = query(
            "MATCH (pr:Project {id: $project}), (p:Point {id: $point})
             CREATE (pr)-[:CONTAINS]->(p)",
        )
        .param("project", project.0)
        .param("point", point.0);
        self.run(q).await
    }

    pub(crate) async fn set_project_updated(&mut self, project: ProjectId) -> Result<()> {
        let q = query(
            "MATCH (pr:Project {id: $id})
             SET pr.updated_at = $now
             RETURN count(pr) AS cnt",
        )
        .param("id", project.0)
        .param("now", Utc::now().to_rfc3339());

        let touched = match self.one(q).await? {
            Some(row) => get::<i64>(&row, "cnt")?,
            None => 0,
        };
        if touched == 0 {
            return Err(StoreError::Backend(format!(
                "no row in table \"project\" with project_id = {project}"
            )));
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn require_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(StoreError::not_null("point", "point_title"));
    }
    Ok(())
}

fn title_conflict(title: &str) -> StoreError {
    StoreError::unique(POINT_TITLE_KEY, format_args!("point_title = '{title}'"))
}
