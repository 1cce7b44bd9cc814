//! pathway-core: Shared domain types, configuration, and error handling for Pathway.
//!
//! This crate provides the foundational pieces used across all Pathway crates:
//! - Point, edge, and project types for the connectivity graph
//! - Point placement modes used when creating points
//! - Configuration loading (file + environment)
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{GraphSettings, Neo4jSettings, PathwayConfig};
pub use error::CoreError;
pub use types::{
    Direction, Edge, ItemId, NewPoint, Point, PointId, PointPlacement, PointView, Project,
    ProjectId, UserId,
};
