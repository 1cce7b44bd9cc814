//! Bounded backward-path check run before every edge insert.
//!
//! Only paths of at most `max_depth` edges are searched, so a cycle longer
//! than `max_depth + 1` can still be closed. Raising the bound raises the
//! cost of every insert.

use pathway_core::PointId;
use pathway_graph::EdgeStore;

use crate::error::{PathError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ReachabilityValidator {
    max_depth: u32,
}

impl ReachabilityValidator {
    /// A depth of zero would never find a backward path, so the bound is at
    /// least one edge.
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Reject `origin → destination` if `destination` already reaches
    /// `origin` within `max_depth` edges.
    pub async fn assert_no_cycle<T>(
        &self,
        tx: &mut T,
        origin: PointId,
        destination: PointId,
    ) -> Result<()>
    where
        T: EdgeStore + ?Sized,
    {
        let backward = tx
            .exists_path_within_depth(destination, origin, self.max_depth)
            .await?;

        tracing::debug!(
            %origin,
            %destination,
            max_depth = self.max_depth,
            backward,
            "Checked for backward path"
        );

        if backward {
            return Err(PathError::BackwardPath {
                depth: self.max_depth,
                origin,
                destination,
            });
        }
        Ok(())
    }
}
