//! Pathway Graph: transactional persistence for points, edges, and projects.
//!
//! The store contracts in [`store`] are the only way the engine touches
//! persisted state. Every operation runs inside a transaction handle so a
//! multi-step mutation is published atomically or not at all.
//!
//! Two backends are provided: [`memory::MemoryGraphStore`] for tests and
//! embedded use, and [`client::Neo4jStore`] backed by Neo4j.

pub mod client;
pub mod error;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, Neo4jStore, Neo4jTx};
pub use error::{ConstraintKind, StoreError};
pub use memory::{Fault, MemoryGraphStore, MemoryTx};
pub use store::{EdgeStore, GraphStore, GraphTx, PointStore, ProjectStore};
