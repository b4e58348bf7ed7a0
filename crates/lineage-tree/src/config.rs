use std::path::Path;
use std::time::Duration;

use lineage_resolver::DEFAULT_CACHE_CAPACITY;
use lineage_store::Neo4jConfig;
use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};

/// Top-level configuration for a [`DependencyTree`](crate::DependencyTree).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Graph database connection, used by [`DependencyTree::open`](crate::DependencyTree::open).
    pub graph: Neo4jConfig,
    pub consistency: ConsistencyConfig,
    /// Deadline applied to queries that carry no cancel token.
    pub default_query_timeout_ms: Option<u64>,
    /// Resolver cache bound, per table (objects, actions).
    pub cache_capacity: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            graph: Neo4jConfig::default(),
            consistency: ConsistencyConfig::default(),
            default_query_timeout_ms: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl TreeConfig {
    pub fn from_toml_str(text: &str) -> TreeResult<Self> {
        toml::from_str(text).map_err(|e| TreeError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> TreeResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| TreeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn default_query_timeout(&self) -> Option<Duration> {
        self.default_query_timeout_ms.map(Duration::from_millis)
    }
}

/// Startup consistency check between the graph and the domain store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Run the check at all. Turning it off is logged.
    pub enabled: bool,
    /// Number of nodes sampled for the per-node checks.
    pub sample_size: usize,
    /// Also require every sampled node to resolve to a live domain object.
    pub verify_domain_presence: bool,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_size: 64,
            verify_domain_presence: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = TreeConfig::default();
        assert!(c.consistency.enabled);
        assert_eq!(c.consistency.sample_size, 64);
        assert!(!c.consistency.verify_domain_presence);
        assert!(c.default_query_timeout().is_none());
        assert_eq!(c.cache_capacity, 10_000);
        assert_eq!(c.graph.database, "neo4j");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = TreeConfig::from_toml_str(
            r#"
            default_query_timeout_ms = 2500
            cache_capacity = 128

            [graph]
            uri = "http://graph.internal:7474"
            user = "lineage"

            [consistency]
            sample_size = 8
            "#,
        )
        .unwrap();
        assert_eq!(c.graph.uri, "http://graph.internal:7474");
        assert_eq!(c.graph.user.as_deref(), Some("lineage"));
        assert_eq!(c.graph.database, "neo4j");
        assert_eq!(c.consistency.sample_size, 8);
        assert!(c.consistency.enabled);
        assert_eq!(c.default_query_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(c.cache_capacity, 128);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = TreeConfig::from_toml_str("consistency = 3").unwrap_err();
        assert!(matches!(err, TreeError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[consistency]\nenabled = false").unwrap();
        let c = TreeConfig::load(file.path()).unwrap();
        assert!(!c.consistency.enabled);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TreeConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, TreeError::Config(_)));
    }
}
