//! In-memory transactional [`GraphStore`].
//!
//! Each transaction works on a private copy of the committed state and keeps
//! a log of its writes. Commit replays the log against the latest committed
//! state, re-checking every constraint, and swaps the result in only if the
//! whole log applies. Id sequences are shared and never rolled back.
//!
//! Reachability is a bounded breadth-first search over the transaction's
//! view of the edge set.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pathway_core::{
    Edge, ItemId, NewPoint, Point, PointId, PointView, Project, ProjectId, UserId,
};

use crate::error::{
    Result, StoreError, EDGE_DESTINATION_FKEY, EDGE_ORIGIN_FKEY, EDGE_PAIR_KEY, ITEM_POINT_FKEY,
    MEMBERSHIP_KEY, MEMBERSHIP_POINT_FKEY, MEMBERSHIP_PROJECT_FKEY, POINT_TITLE_KEY,
};
use crate::store::{EdgeStore, GraphStore, GraphTx, PointStore, ProjectStore};

/// A failure to inject into matching writes, for exercising rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail inserting the edge `origin → destination`.
    EdgeInsert {
        origin: PointId,
        destination: PointId,
    },
    /// Fail inserting a point with this title.
    PointInsert { title: String },
    /// Fail adding any point to this project.
    MembershipInsert { project: ProjectId },
    /// Fail creating a project for this user.
    ProjectInsert { created_by: UserId },
}

/// A single write, as recorded in a transaction log.
#[derive(Debug, Clone)]
enum WriteOp {
    InsertPoint(Point),
    UpdatePoint(Point),
    DeletePoint(PointId),
    InsertEdge(Edge),
    DeleteEdge(PointId, PointId),
    InsertProject(Project),
    AddMembership(ProjectId, PointId),
    TouchProject(ProjectId, DateTime<Utc>),
}

#[derive(Debug, Clone, Default)]
struct GraphState {
    points: BTreeMap<PointId, Point>,
    edges: BTreeMap<(PointId, PointId), Edge>,
    projects: BTreeMap<ProjectId, Project>,
    memberships: BTreeSet<(ProjectId, PointId)>,
    items: BTreeMap<PointId, Vec<ItemId>>,
}

impl GraphState {
    /// Apply one write, enforcing the store's constraints.
    fn apply(&mut self, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::InsertPoint(point) => {
                check_title(&point.title)?;
                self.check_title_free(&point.title, point.id)?;
                self.points.insert(point.id, point.clone());
            }
            WriteOp::UpdatePoint(point) => {
                check_title(&point.title)?;
                if !self.points.contains_key(&point.id) {
                    return Err(StoreError::Backend(format!(
                        "no row in table \"point\" with point_id = {}",
                        point.id
                    )));
                }
                self.check_title_free(&point.title, point.id)?;
                self.points.insert(point.id, point.clone());
            }
            WriteOp::DeletePoint(id) => {
                if let Some(edge) = self.edges.values().find(|e| e.touches(*id)) {
                    let constraint = if edge.origin == *id {
                        EDGE_ORIGIN_FKEY
                    } else {
                        EDGE_DESTINATION_FKEY
                    };
                    return Err(StoreError::still_referenced(
                        "point",
                        constraint,
                        "edge",
                        format_args!("point_id = {id}"),
                    ));
                }
                if self.items.get(id).is_some_and(|items| !items.is_empty()) {
                    return Err(StoreError::still_referenced(
                        "point",
                        ITEM_POINT_FKEY,
                        "item",
                        format_args!("point_id = {id}"),
                    ));
                }
                self.points.remove(id);
                self.items.remove(id);
                self.memberships.retain(|(_, point)| point != id);
            }
            WriteOp::InsertEdge(edge) => {
                if !self.points.contains_key(&edge.origin) {
                    return Err(StoreError::missing_reference(
                        "edge",
                        EDGE_ORIGIN_FKEY,
                        format_args!("origin_point = {}", edge.origin),
                    ));
                }
                if !self.points.contains_key(&edge.destination) {
                    return Err(StoreError::missing_reference(
                        "edge",
                        EDGE_DESTINATION_FKEY,
                        format_args!("destination_point = {}", edge.destination),
                    ));
                }
                if self.edges.contains_key(&edge.endpoints()) {
                    return Err(StoreError::unique(
                        EDGE_PAIR_KEY,
                        format_args!("{} -> {}", edge.origin, edge.destination),
                    ));
                }
                self.edges.insert(edge.endpoints(), edge.clone());
            }
            WriteOp::DeleteEdge(origin, destination) => {
                self.edges.remove(&(*origin, *destination));
            }
            WriteOp::InsertProject(project) => {
                self.projects.insert(project.id, project.clone());
            }
            WriteOp::AddMembership(project, point) => {
                if !self.projects.contains_key(project) {
                    return Err(StoreError::missing_reference(
                        "project_point",
                        MEMBERSHIP_PROJECT_FKEY,
                        format_args!("project_id = {project}"),
                    ));
                }
                if !self.points.contains_key(point) {
                    return Err(StoreError::missing_reference(
                        "project_point",
                        MEMBERSHIP_POINT_FKEY,
                        format_args!("point_id = {point}"),
                    ));
                }
                if !self.memberships.insert((*project, *point)) {
                    return Err(StoreError::unique(
                        MEMBERSHIP_KEY,
                        format_args!("project_id = {project}, point_id = {point}"),
                    ));
                }
            }
            WriteOp::TouchProject(project, at) => match self.projects.get_mut(project) {
                Some(existing) => existing.updated_at = *at,
                None => {
                    return Err(StoreError::Backend(format!(
                        "no row in table \"project\" with project_id = {project}"
                    )))
                }
            },
        }
        Ok(())
    }

    fn check_title_free(&self, title: &str, owner: PointId) -> Result<()> {
        let taken = self
            .points
            .values()
            .any(|p| p.id != owner && p.title == title);
        if taken {
            return Err(StoreError::unique(
                POINT_TITLE_KEY,
                format_args!("point_title = '{title}'"),
            ));
        }
        Ok(())
    }

    /// Outgoing neighbours of `point`, in id order.
    fn successors(&self, point: PointId) -> impl Iterator<Item = PointId> + '_ {
        self.edges
            .range((point, PointId(i64::MIN))..=(point, PointId(i64::MAX)))
            .map(|(&(_, destination), _)| destination)
    }

    /// Breadth-first search from `from`, following at most `depth` edges.
    fn reaches_within(&self, from: PointId, to: PointId, depth: u32) -> bool {
        let mut visited = HashSet::new();
        visited.insert(from);

        // (point, hops from `from`)
        let mut queue: VecDeque<(PointId, u32)> = VecDeque::new();
        queue.push_back((from, 0));

        while let Some((point, hops)) = queue.pop_front() {
            if hops >= depth {
                continue;
            }
            for next in self.successors(point) {
                if next == to {
                    return true;
                }
                if visited.insert(next) {
                    queue.push_back((next, hops + 1));
                }
            }
        }
        false
    }
}

fn check_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(StoreError::not_null("point", "point_title"));
    }
    Ok(())
}

struct Shared {
    committed: Mutex<GraphState>,
    point_seq: AtomicI64,
    project_seq: AtomicI64,
    faults: Mutex<Vec<Fault>>,
}

impl Shared {
    fn committed(&self) -> Result<MutexGuard<'_, GraphState>> {
        self.committed
            .lock()
            .map_err(|_| StoreError::Backend("committed state lock poisoned".to_string()))
    }

    fn check_fault(&self, matches: impl Fn(&Fault) -> bool) -> Result<()> {
        let faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Backend("fault list lock poisoned".to_string()))?;
        match faults.iter().find(|f| matches(f)) {
            Some(fault) => Err(StoreError::Backend(format!("injected fault: {fault:?}"))),
            None => Ok(()),
        }
    }
}

/// In-memory store. Clone is cheap and shares state.
#[derive(Clone)]
pub struct MemoryGraphStore {
    shared: Arc<Shared>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                committed: Mutex::new(GraphState::default()),
                point_seq: AtomicI64::new(0),
                project_seq: AtomicI64::new(0),
                faults: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make every matching write fail until [`clear_faults`](Self::clear_faults).
    pub fn inject_fault(&self, fault: Fault) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.push(fault);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.clear();
        }
    }

    /// Attach an item to a committed point, outside any transaction.
    pub fn attach_item(&self, point: PointId, item: ItemId) -> Result<()> {
        let mut state = self.shared.committed()?;
        if !state.points.contains_key(&point) {
            return Err(StoreError::missing_reference(
                "item",
                ITEM_POINT_FKEY,
                format_args!("point_id = {point}"),
            ));
        }
        state.items.entry(point).or_default().push(item);
        Ok(())
    }

    /// Detach every item from a committed point.
    pub fn detach_items(&self, point: PointId) -> Result<()> {
        self.shared.committed()?.items.remove(&point);
        Ok(())
    }

    /// Committed edges, ordered by `(origin, destination)`.
    pub fn edges(&self) -> Vec<Edge> {
        self.shared
            .committed()
            .map(|state| state.edges.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed points, ordered by id.
    pub fn points(&self) -> Vec<Point> {
        self.shared
            .committed()
            .map(|state| state.points.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The id the next inserted point will receive.
    pub fn peek_next_point_id(&self) -> PointId {
        PointId(self.shared.point_seq.load(Ordering::SeqCst) + 1)
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx> {
        let working = self.shared.committed()?.clone();
        Ok(MemoryTx {
            shared: Arc::clone(&self.shared),
            working,
            log: Vec::new(),
        })
    }
}

/// A transaction over a [`MemoryGraphStore`].
pub struct MemoryTx {
    shared: Arc<Shared>,
    working: GraphState,
    log: Vec<WriteOp>,
}

impl MemoryTx {
    /// Apply to the working copy and record for commit.
    fn write(&mut self, op: WriteOp) -> Result<()> {
        self.working.apply(&op)?;
        self.log.push(op);
        Ok(())
    }
}

#[async_trait]
impl PointStore for MemoryTx {
    async fn find_point(&mut self, id: PointId) -> Result<Option<Point>> {
        Ok(self.working.points.get(&id).cloned())
    }

    async fn find_point_view(&mut self, id: PointId) -> Result<Option<PointView>> {
        Ok(self.working.points.get(&id).map(|point| PointView {
            point: point.clone(),
            item_ids: self.working.items.get(&id).cloned().unwrap_or_default(),
        }))
    }

    async fn exists_point(&mut self, id: PointId) -> Result<bool> {
        Ok(self.working.points.contains_key(&id))
    }

    async fn exists_all_points(&mut self, ids: &[PointId]) -> Result<bool> {
        Ok(ids.iter().all(|id| self.working.points.contains_key(id)))
    }

    async fn insert_point(&mut self, point: &NewPoint) -> Result<Point> {
        self.shared
            .check_fault(|f| matches!(f, Fault::PointInsert { title } if *title == point.title))?;

        let now = Utc::now();
        let stored = Point {
            id: PointId(self.shared.point_seq.fetch_add(1, Ordering::SeqCst) + 1),
            title: point.title.clone(),
            summary: point.summary.clone(),
            created_by: point.created_by,
            created_at: now,
            updated_at: now,
        };
        self.write(WriteOp::InsertPoint(stored.clone()))?;
        Ok(stored)
    }

    async fn update_point(&mut self, point: &Point) -> Result<Point> {
        self.write(WriteOp::UpdatePoint(point.clone()))?;
        Ok(point.clone())
    }

    async fn delete_point(&mut self, id: PointId) -> Result<()> {
        self.write(WriteOp::DeletePoint(id))
    }

    async fn list_points(&mut self) -> Result<Vec<Point>> {
        Ok(self.working.points.values().cloned().collect())
    }
}

#[async_trait]
impl EdgeStore for MemoryTx {
    async fn find_edge(&mut self, origin: PointId, destination: PointId) -> Result<Option<Edge>> {
        Ok(self.working.edges.get(&(origin, destination)).cloned())
    }

    async fn insert_edge(&mut self, origin: PointId, destination: PointId) -> Result<Edge> {
        self.shared.check_fault(|f| {
            matches!(f, Fault::EdgeInsert { origin: o, destination: d } if *o == origin && *d == destination)
        })?;

        let edge = Edge {
            origin,
            destination,
            created_at: Utc::now(),
        };
        self.write(WriteOp::InsertEdge(edge.clone()))?;
        Ok(edge)
    }

    async fn delete_edge(&mut self, origin: PointId, destination: PointId) -> Result<bool> {
        if !self.working.edges.contains_key(&(origin, destination)) {
            return Ok(false);
        }
        self.write(WriteOp::DeleteEdge(origin, destination))?;
        Ok(true)
    }

    async fn exists_path_within_depth(
        &mut self,
        from: PointId,
        to: PointId,
        depth: u32,
    ) -> Result<bool> {
        Ok(self.working.reaches_within(from, to, depth))
    }

    async fn find_edges_touching(&mut self, ids: &[PointId]) -> Result<Vec<Edge>> {
        let wanted: HashSet<PointId> = ids.iter().copied().collect();
        Ok(self
            .working
            .edges
            .values()
            .filter(|e| wanted.contains(&e.origin) || wanted.contains(&e.destination))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProjectStore for MemoryTx {
    async fn insert_project(&mut self, created_by: UserId) -> Result<Project> {
        self.shared
            .check_fault(|f| matches!(f, Fault::ProjectInsert { created_by: u } if *u == created_by))?;
        let now = Utc::now();
        let project = Project {
            id: ProjectId(self.shared.project_seq.fetch_add(1, Ordering::SeqCst) + 1),
            created_by,
            created_at: now,
            updated_at: now,
        };
        self.write(WriteOp::InsertProject(project.clone()))?;
        Ok(project)
    }

    async fn exists_project(&mut self, id: ProjectId) -> Result<bool> {
        Ok(self.working.projects.contains_key(&id))
    }

    async fn add_point_to_project(&mut self, project: ProjectId, point: PointId) -> Result<()> {
        self.shared
            .check_fault(|f| matches!(f, Fault::MembershipInsert { project: p } if *p == project))?;
        self.write(WriteOp::AddMembership(project, point))
    }

    async fn point_ids_of_project(&mut self, project: ProjectId) -> Result<Vec<PointId>> {
        Ok(self
            .working
            .memberships
            .range((project, PointId(i64::MIN))..=(project, PointId(i64::MAX)))
            .map(|&(_, point)| point)
            .collect())
    }

    async fn touch_project(&mut self, project: ProjectId) -> Result<()> {
        self.write(WriteOp::TouchProject(project, Utc::now()))
    }
}

#[async_trait]
impl GraphTx for MemoryTx {
    async fn commit(self) -> Result<()> {
        if self.log.is_empty() {
            return Ok(());
        }

        let mut committed = self.shared.committed()?;
        let mut next = committed.clone();
        for op in &self.log {
            next.apply(op)?;
        }
        *committed = next;

        tracing::debug!(writes = self.log.len(), "Committed in-memory transaction");
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        tracing::debug!(writes = self.log.len(), "Rolled back in-memory transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConstraintKind;

    async fn seed_points(store: &MemoryGraphStore, titles: &[&str]) -> Vec<PointId> {
        let mut tx = store.begin().await.unwrap();
        let mut ids = Vec::new();
        for title in titles {
            let point = tx
                .insert_point(&NewPoint::new(*title, UserId(1)))
                .await
                .unwrap();
            ids.push(point.id);
        }
        tx.commit().await.unwrap();
        ids
    }

    async fn seed_edges(store: &MemoryGraphStore, edges: &[(PointId, PointId)]) {
        let mut tx = store.begin().await.unwrap();
        for &(o, d) in edges {
            tx.insert_edge(o, d).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_ids_are_sequential() {
        let store = MemoryGraphStore::new();
        assert_eq!(store.peek_next_point_id(), PointId(1));
        let ids = seed_points(&store, &["a", "b", "c"]).await;
        assert_eq!(ids, vec![PointId(1), PointId(2), PointId(3)]);
        assert_eq!(store.peek_next_point_id(), PointId(4));
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let point = tx.insert_point(&NewPoint::new("a", UserId(1))).await.unwrap();
        assert!(tx.exists_point(point.id).await.unwrap());

        let mut other = store.begin().await.unwrap();
        assert!(!other.exists_point(point.id).await.unwrap());
        assert!(store.points().is_empty());

        tx.rollback().await.unwrap();
        assert!(store.points().is_empty());
    }

    #[tokio::test]
    async fn test_sequences_are_not_rolled_back() {
        let store = MemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_point(&NewPoint::new("a", UserId(1))).await.unwrap();
        drop(tx);

        let ids = seed_points(&store, &["b"]).await;
        assert_eq!(ids, vec![PointId(2)]);
    }

    #[tokio::test]
    async fn test_duplicate_title_is_unique_violation() {
        let store = MemoryGraphStore::new();
        seed_points(&store, &["a"]).await;

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_point(&NewPoint::new("a", UserId(2)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ConstraintKind::Unique));
        assert!(err.message().contains(POINT_TITLE_KEY));
    }

    #[tokio::test]
    async fn test_blank_title_is_not_null_violation() {
        let store = MemoryGraphStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .insert_point(&NewPoint::new("  ", UserId(1)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ConstraintKind::NotNull));
    }

    #[tokio::test]
    async fn test_edge_constraints() {
        let store = MemoryGraphStore::new();
        let ids = seed_points(&store, &["a", "b"]).await;
        seed_edges(&store, &[(ids[0], ids[1])]).await;

        let mut tx = store.begin().await.unwrap();
        let dup = tx.insert_edge(ids[0], ids[1]).await.unwrap_err();
        assert_eq!(dup.kind(), Some(ConstraintKind::Unique));
        assert!(dup.message().contains(EDGE_PAIR_KEY));

        let missing = tx.insert_edge(ids[0], PointId(99)).await.unwrap_err();
        assert_eq!(missing.kind(), Some(ConstraintKind::ForeignKey));
        assert!(missing.message().contains(EDGE_DESTINATION_FKEY));
    }

    #[tokio::test]
    async fn test_delete_point_blocked_by_edge_and_item() {
        let store = MemoryGraphStore::new();
        let ids = seed_points(&store, &["a", "b", "c"]).await;
        seed_edges(&store, &[(ids[0], ids[1])]).await;
        store.attach_item(ids[2], ItemId(7)).unwrap();

        let mut tx = store.begin().await.unwrap();
        let by_edge = tx.delete_point(ids[1]).await.unwrap_err();
        assert!(by_edge.message().contains("on table \"edge\""));
        let by_item = tx.delete_point(ids[2]).await.unwrap_err();
        assert!(by_item.message().contains("on table \"item\""));
    }

    #[tokio::test]
    async fn test_delete_point_removes_memberships() {
        let store = MemoryGraphStore::new();
        let ids = seed_points(&store, &["a"]).await;

        let mut tx = store.begin().await.unwrap();
        let project = tx.insert_project(UserId(1)).await.unwrap();
        tx.add_point_to_project(project.id, ids[0]).await.unwrap();
        tx.delete_point(ids[0]).await.unwrap();
        assert!(tx.point_ids_of_project(project.id).await.unwrap().is_empty());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_reachability_is_bounded() {
        let store = MemoryGraphStore::new();
        let ids = seed_points(&store, &["p1", "p2", "p3", "p4", "p5"]).await;
        seed_edges(
            &store,
            &[(ids[0], ids[1]), (ids[1], ids[2]), (ids[2], ids[3]), (ids[3], ids[4])],
        )
        .await;

        let mut tx = store.begin().await.unwrap();
        assert!(tx.exists_path_within_depth(ids[0], ids[1], 1).await.unwrap());
        assert!(tx.exists_path_within_depth(ids[0], ids[4], 4).await.unwrap());
        assert!(!tx.exists_path_within_depth(ids[0], ids[4], 3).await.unwrap());
        assert!(!tx.exists_path_within_depth(ids[4], ids[0], 10).await.unwrap());
        assert!(!tx.exists_path_within_depth(ids[0], ids[0], 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_rechecks_constraints() {
        let store = MemoryGraphStore::new();
        let ids = seed_points(&store, &["a", "b"]).await;

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.insert_edge(ids[0], ids[1]).await.unwrap();
        second.insert_edge(ids[0], ids[1]).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert_eq!(err.kind(), Some(ConstraintKind::Unique));
        assert_eq!(store.edges().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_publishes_nothing() {
        let store = MemoryGraphStore::new();
        let ids = seed_points(&store, &["a", "b", "c"]).await;

        let mut racing = store.begin().await.unwrap();
        racing.insert_edge(ids[1], ids[2]).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_edge(ids[0], ids[1]).await.unwrap();
        tx.insert_edge(ids[1], ids[2]).await.unwrap();

        racing.commit().await.unwrap();
        assert!(tx.commit().await.is_err());

        let edges: Vec<_> = store.edges().iter().map(Edge::endpoints).collect();
        assert_eq!(edges, vec![(ids[1], ids[2])]);
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let store = MemoryGraphStore::new();
        let ids = seed_points(&store, &["a", "b"]).await;
        store.inject_fault(Fault::EdgeInsert {
            origin: ids[0],
            destination: ids[1],
        });

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_edge(ids[0], ids[1]).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(tx.insert_edge(ids[1], ids[0]).await.is_ok());

        store.clear_faults();
        assert!(tx.insert_edge(ids[0], ids[1]).await.is_ok());
    }

    #[tokio::test]
    async fn test_point_view_lists_items_in_order() {
        let store = MemoryGraphStore::new();
        let ids = seed_points(&store, &["a"]).await;
        store.attach_item(ids[0], ItemId(3)).unwrap();
        store.attach_item(ids[0], ItemId(1)).unwrap();

        let mut tx = store.begin().await.unwrap();
        let view = tx.find_point_view(ids[0]).await.unwrap().unwrap();
        assert_eq!(view.item_ids, vec![ItemId(3), ItemId(1)]);
        assert!(tx.find_point_view(PointId(42)).await.unwrap().is_none());
    }
}
