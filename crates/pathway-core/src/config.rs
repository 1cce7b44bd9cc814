//! Configuration management for Pathway services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`PATHWAY__` prefix, `__` separator)
//! 2. Config file (`pathway.toml` by default)
//! 3. Defaults

use serde::Deserialize;

use crate::error::CoreError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathwayConfig {
    pub graph: GraphSettings,
    pub neo4j: Neo4jSettings,
}

/// Settings for the graph-integrity engine.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSettings {
    /// Maximum number of hops searched when looking for a backward path
    /// before inserting an edge. Cycles longer than `max_depth + 1` are
    /// not detected.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of lock stripes used to serialise mutations on the same
    /// point pair.
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
}

/// Connection settings for the Neo4j store.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_max_depth() -> u32 {
    5
}

fn default_lock_stripes() -> usize {
    64
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "pathway-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            lock_stripes: default_lock_stripes(),
        }
    }
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl GraphSettings {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_depth == 0 {
            return Err(CoreError::InvalidSetting {
                key: "graph.max_depth".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.lock_stripes == 0 {
            return Err(CoreError::InvalidSetting {
                key: "graph.lock_stripes".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl PathwayConfig {
    /// Load configuration from `{file_prefix}.toml` (optional) overlaid by
    /// `PATHWAY__*` environment variables.
    pub fn load(file_prefix: &str) -> Result<Self, CoreError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("PATHWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: PathwayConfig = cfg.try_deserialize()?;
        loaded.graph.validate()?;

        tracing::debug!(
            max_depth = loaded.graph.max_depth,
            lock_stripes = loaded.graph.lock_stripes,
            neo4j_uri = %loaded.neo4j.uri,
            "Loaded configuration"
        );
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PathwayConfig::default();
        assert_eq!(config.graph.max_depth, 5);
        assert_eq!(config.graph.lock_stripes, 64);
        assert_eq!(config.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(config.neo4j.max_connections, 16);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = PathwayConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.graph.max_depth, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("pathway.toml"),
            "[graph]\nmax_depth = 8\n\n[neo4j]\nuri = \"bolt://graph:7687\"\n",
        )
        .unwrap();

        let prefix = dir.path().join("pathway");
        let config = PathwayConfig::load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.graph.max_depth, 8);
        assert_eq!(config.graph.lock_stripes, 64);
        assert_eq!(config.neo4j.uri, "bolt://graph:7687");
        assert_eq!(config.neo4j.user, "neo4j");
    }

    #[test]
    fn test_zero_depth_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pathway.toml"), "[graph]\nmax_depth = 0\n").unwrap();

        let prefix = dir.path().join("pathway");
        let err = PathwayConfig::load(prefix.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSetting { ref key, .. } if key == "graph.max_depth"));
    }
}
