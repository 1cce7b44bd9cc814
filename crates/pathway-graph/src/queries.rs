//! Read operations against Neo4j.

use chrono::{DateTime, Utc};
use neo4rs::{query, Row};

use pathway_core::{Edge, ItemId, Point, PointId, PointView, ProjectId, UserId};

use crate::client::{get, Neo4jTx};
use crate::error::{Result, StoreError};

const POINT_COLUMNS: &str = "p.id AS id, p.title AS title, coalesce(p.summary, '') AS summary,
     p.created_by AS created_by, p.created_at AS created_at, p.updated_at AS updated_at";

impl Neo4jTx {
    // ── Points ───────────────────────────────────────────────────

    pub(crate) async fn fetch_point(&mut self, id: PointId) -> Result<Option<Point>> {
        let cypher = format!("MATCH (p:Point {{id: $id}}) RETURN {POINT_COLUMNS}");
        let q = query(&cypher).param("id", id.0);

        match self.one(q).await? {
            Some(row) => Ok(Some(point_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn fetch_point_view(&mut self, id: PointId) -> Result<Option<PointView>> {
        let cypher = format!(
            "MATCH (p:Point {{id: $id}})
             OPTIONAL MATCH (i:Item)-[a:ATTACHED_TO]->(p)
             WITH p, i, a ORDER BY a.position
             WITH p, [x IN collect(i.id) WHERE x IS NOT NULL] AS item_ids
             RETURN {POINT_COLUMNS}, item_ids"
        );
        let q = query(&cypher).param("id", id.0);

        match self.one(q).await? {
            Some(row) => {
                let point = point_from_row(&row)?;
                let item_ids: Vec<i64> = get(&row, "item_ids")?;
                Ok(Some(PointView {
                    point,
                    item_ids: item_ids.into_iter().map(ItemId).collect(),
                }))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn fetch_all_exist(&mut self, ids: &[PointId]) -> Result<bool> {
        let mut unique: Vec<i64> = ids.iter().map(|id| id.0).collect();
        unique.sort_unstable();
        unique.dedup();

        let q = query(
            "UNWIND $ids AS wanted
             OPTIONAL MATCH (p:Point {id: wanted})
             RETURN count(p) AS found",
        )
        .param("ids", unique.clone());

        let found: i64 = match self.one(q).await? {
            Some(row) => get(&row, "found")?,
            None => 0,
        };
        Ok(found == unique.len() as i64)
    }

    pub(crate) async fn fetch_all_points(&mut self) -> Result<Vec<Point>> {
        let cypher = format!("MATCH (p:Point) RETURN {POINT_COLUMNS} ORDER BY id");
        let rows = self.rows(query(&cypher)).await?;
        rows.iter().map(point_from_row).collect()
    }

    // ── Edges ────────────────────────────────────────────────────

    pub(crate) async fn fetch_edge(
        &mut self,
        origin: PointId,
        destination: PointId,
    ) -> Result<Option<Edge>> {
        let q = query(
            "MATCH (a:Point {id: $origin})-[r:LEADS_TO]->(b:Point {id: $destination})
             RETURN a.id AS origin, b.id AS destination, r.created_at AS created_at",
        )
        .param("origin", origin.0)
        .param("destination", destination.0);

        match self.one(q).await? {
            Some(row) => Ok(Some(edge_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Variable-length patterns cannot take the bound as a parameter, so
    /// the depth is formatted into the query text.
    pub(crate) async fn fetch_path_exists(
        &mut self,
        from: PointId,
        to: PointId,
        depth: u32,
    ) -> Result<bool> {
        if depth == 0 {
            return Ok(false);
        }
        let cypher = format!(
            "MATCH (a:Point {{id: $from}}), (b:Point {{id: $to}})
             RETURN EXISTS {{ MATCH (a)-[:LEADS_TO*1..{depth}]->(b) }} AS reachable"
        );
        let q = query(&cypher).param("from", from.0).param("to", to.0);

        match self.one(q).await? {
            Some(row) => get(&row, "reachable"),
            None => Ok(false),
        }
    }

    pub(crate) async fn fetch_edges_touching(&mut self, ids: &[PointId]) -> Result<Vec<Edge>> {
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let q = query(
            "MATCH (a:Point)-[r:LEADS_TO]->(b:Point)
             WHERE a.id IN $ids OR b.id IN $ids
             RETURN a.id AS origin, b.id AS destination, r.created_at AS created_at
             ORDER BY origin, destination",
        )
        .param("ids", ids);

        let rows = self.rows(q).await?;
        rows.iter().map(edge_from_row).collect()
    }

    // ── Projects ─────────────────────────────────────────────────

    pub(crate) async fn fetch_project_exists(&mut self, id: ProjectId) -> Result<bool> {
        let q = query("MATCH (pr:Project {id: $id}) RETURN count(pr) AS cnt").param("id", id.0);

        match self.one(q).await? {
            Some(row) => Ok(get::<i64>(&row, "cnt")? > 0),
            None => Ok(false),
        }
    }

    pub(crate) async fn fetch_project_point_ids(
        &mut self,
        project: ProjectId,
    ) -> Result<Vec<PointId>> {
        let q = query(
            "MATCH (:Project {id: $project})-[:CONTAINS]->(p:Point)
             RETURN p.id AS id ORDER BY id",
        )
        .param("project", project.0);

        let rows = self.rows(q).await?;
        rows.iter()
            .map(|row| get::<i64>(row, "id").map(PointId))
            .collect()
    }
}

// ── Row Decoding ─────────────────────────────────────────────────

pub(crate) fn point_from_row(row: &Row) -> Result<Point> {
    let summary: String = get(row, "summary")?;
    Ok(Point {
        id: PointId(get(row, "id")?),
        title: get(row, "title")?,
        summary: (!summary.is_empty()).then_some(summary),
        created_by: UserId(get(row, "created_by")?),
        created_at: parse_time(row, "created_at")?,
        updated_at: parse_time(row, "updated_at")?,
    })
}

pub(crate) fn edge_from_row(row: &Row) -> Result<Edge> {
    Ok(Edge {
        origin: PointId(get(row, "origin")?),
        destination: PointId(get(row, "destination")?),
        created_at: parse_time(row, "created_at")?,
    })
}

/// Timestamps are stored as RFC 3339 strings.
pub(crate) fn parse_time(row: &Row, field: &str) -> Result<DateTime<Utc>> {
    let raw: String = get(row, field)?;
    parse_rfc3339(field, &raw)
}

fn parse_rfc3339(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trips_through_storage_format() {
        let now = Utc::now();
        let parsed = parse_rfc3339("created_at", &now.to_rfc3339()).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn malformed_timestamp_is_a_decode_error() {
        let err = parse_rfc3339("updated_at", "yesterday").unwrap_err();
        assert!(matches!(err, StoreError::Decode { ref field, .. } if field == "updated_at"));
    }
}
