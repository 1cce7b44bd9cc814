//! Integration tests for the Neo4j store.
//!
//! These tests require a running Neo4j reachable with the default settings.
//! Run with: cargo test --package pathway-graph --test neo4j -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use pathway_core::{Neo4jSettings, NewPoint, PointId, UserId};
use pathway_graph::{
    ConstraintKind, EdgeStore, GraphClient, GraphStore, GraphTx, Neo4jStore, PointStore,
    ProjectStore, StoreError,
};

async fn connect_or_skip() -> Option<Neo4jStore> {
    let settings = Neo4jSettings::default();
    match GraphClient::connect(&settings).await {
        Ok(client) => {
            client.ensure_schema().await.ok()?;
            Some(Neo4jStore::new(client))
        }
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

/// Title prefix unique to one test run.
fn run_prefix(test: &str) -> String {
    format!("it-{test}-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn cleanup(store: &Neo4jStore, prefix: &str) {
    let q = neo4rs::query("MATCH (p:Point) WHERE p.title STARTS WITH $prefix DETACH DELETE p")
        .param("prefix", prefix.to_string());
    let _ = store.client().run(q).await;
}

async fn seed(store: &Neo4jStore, prefix: &str, names: &[&str]) -> Vec<PointId> {
    let mut tx = store.begin().await.unwrap();
    let mut ids = Vec::new();
    for name in names {
        let point = tx
            .insert_point(&NewPoint::new(format!("{prefix}-{name}"), UserId(1)))
            .await
            .unwrap();
        ids.push(point.id);
    }
    tx.commit().await.unwrap();
    ids
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_point_round_trip() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    let prefix = run_prefix("round-trip");

    let mut tx = store.begin().await.unwrap();
    let created = tx
        .insert_point(&NewPoint::new(format!("{prefix}-A"), UserId(7)).with_summary("first"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let view = tx.find_point_view(created.id).await.unwrap().unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(view.point.title, created.title);
    assert_eq!(view.point.summary.as_deref(), Some("first"));
    assert_eq!(view.point.created_by, UserId(7));
    assert!(view.item_ids.is_empty());

    cleanup(&store, &prefix).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_duplicate_title_rejected() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    let prefix = run_prefix("dup-title");
    seed(&store, &prefix, &["A"]).await;

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .insert_point(&NewPoint::new(format!("{prefix}-A"), UserId(1)))
        .await
        .unwrap_err();
    tx.rollback().await.unwrap();

    assert_eq!(err.kind(), Some(ConstraintKind::Unique));
    assert!(err.message().contains("point_title_key"));

    cleanup(&store, &prefix).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_edges_and_bounded_reachability() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    let prefix = run_prefix("reach");
    let ids = seed(&store, &prefix, &["A", "B", "C"]).await;

    let mut tx = store.begin().await.unwrap();
    tx.insert_edge(ids[0], ids[1]).await.unwrap();
    tx.insert_edge(ids[1], ids[2]).await.unwrap();
    let err = tx.insert_edge(ids[0], ids[1]).await.unwrap_err();
    assert!(err.message().contains("edge_origin_destination_key"));

    assert!(tx.exists_path_within_depth(ids[0], ids[2], 2).await.unwrap());
    assert!(!tx.exists_path_within_depth(ids[0], ids[2], 1).await.unwrap());
    assert!(!tx.exists_path_within_depth(ids[2], ids[0], 5).await.unwrap());
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let touching = tx.find_edges_touching(&[ids[1]]).await.unwrap();
    assert_eq!(touching.len(), 2);
    assert!(tx.delete_edge(ids[0], ids[1]).await.unwrap());
    assert!(!tx.delete_edge(ids[0], ids[1]).await.unwrap());
    tx.commit().await.unwrap();

    cleanup(&store, &prefix).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_delete_blocked_by_edge() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    let prefix = run_prefix("delete");
    let ids = seed(&store, &prefix, &["A", "B"]).await;

    let mut tx = store.begin().await.unwrap();
    tx.insert_edge(ids[0], ids[1]).await.unwrap();
    let err = tx.delete_point(ids[1]).await.unwrap_err();
    assert!(matches!(err, StoreError::Constraint { kind: ConstraintKind::ForeignKey, .. }));

    tx.delete_edge(ids[0], ids[1]).await.unwrap();
    tx.delete_point(ids[1]).await.unwrap();
    assert!(!tx.exists_point(ids[1]).await.unwrap());
    tx.commit().await.unwrap();

    cleanup(&store, &prefix).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_project_membership() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    let prefix = run_prefix("project");
    let ids = seed(&store, &prefix, &["A", "B"]).await;

    let mut tx = store.begin().await.unwrap();
    let project = tx.insert_project(UserId(3)).await.unwrap();
    tx.add_point_to_project(project.id, ids[1]).await.unwrap();
    tx.add_point_to_project(project.id, ids[0]).await.unwrap();
    tx.touch_project(project.id).await.unwrap();
    let members = tx.point_ids_of_project(project.id).await.unwrap();
    tx.commit().await.unwrap();

    assert_eq!(members, vec![ids[0], ids[1]]);

    cleanup(&store, &prefix).await;
    let q = neo4rs::query("MATCH (pr:Project {id: $id}) DETACH DELETE pr").param("id", project.id.0);
    let _ = store.client().run(q).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn test_concurrent_edge_inserts_keep_one_edge() {
    let Some(store) = connect_or_skip().await else {
        return;
    };
    let prefix = run_prefix("edge-race");
    let ids = seed(&store, &prefix, &["A", "B"]).await;

    let (a, b) = (ids[0], ids[1]);
    let insert = |store: Neo4jStore| async move {
        let mut tx = store.begin().await.unwrap();
        let inserted = tx.insert_edge(a, b).await;
        match &inserted {
            Ok(_) => tx.commit().await.unwrap(),
            Err(_) => tx.rollback().await.unwrap(),
        }
        inserted
    };
    let (first, second) = tokio::join!(insert(store.clone()), insert(store.clone()));

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(err.kind(), Some(ConstraintKind::Unique));

    let mut tx = store.begin().await.unwrap();
    let edges = tx.find_edges_touching(&[ids[0]]).await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(edges.len(), 1);

    cleanup(&store, &prefix).await;
}
