//! pathway-engine: graph-integrity engine for the Pathway point graph.
//!
//! [`GraphMutationService`] creates, connects, splits, disconnects and
//! deletes points in single store transactions. Before any edge is
//! inserted, [`ReachabilityValidator`] rejects it if the destination
//! already leads back to the origin within the configured depth. Store
//! failures are turned into stable [`ErrorCode`]s by
//! [`translate::ConstraintTranslator`].

pub mod error;
pub mod locks;
pub mod project;
pub mod reachability;
pub mod service;
pub mod translate;
pub mod validate;

pub use error::{ErrorCode, ErrorKind, PathError};
pub use project::{ProjectAggregator, ProjectGraph};
pub use reachability::ReachabilityValidator;
pub use service::{GraphMutationService, PathGraph};
