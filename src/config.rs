//! Node configuration.
//!
//! Loaded from a TOML file, validated, then optionally overridden from the
//! environment (`SWARM_` prefix).
//!
//! ```toml
//! [corpora]
//! registry_dir = "/var/lib/corpora/registry"
//! split_corpora_dir = "/var/lib/corpora/split"
//! multisampled_corpora_dir = "/var/lib/corpora/multisampled"
//! multiproc_chunk_size = 100000000
//! multisampled_subc_size = 1000000
//!
//! [server]
//! listen_port = 8989
//!
//! [workers]
//! num_workers = 8
//!
//! [query]
//! default_max_items = 100
//! gather_timeout_secs = 120
//! ```

use std::env;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::results::DEFAULT_MAX_ITEMS;
use crate::error::{Result, SwarmError};

pub const DEFAULT_CHUNK_SIZE: u64 = 100_000_000;
pub const DEFAULT_SAMPLE_SIZE: u64 = 1_000_000;
pub const DEFAULT_NUM_SAMPLES: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorporaConfig {
    pub registry_dir: PathBuf,
    pub split_corpora_dir: PathBuf,
    pub multisampled_corpora_dir: PathBuf,
    /// Maximum number of positions per split chunk.
    pub multiproc_chunk_size: u64,
    /// Number of positions per multisample shard.
    pub multisampled_subc_size: u64,
    pub default_num_samples: usize,
    /// Fixed seed for multisampling. Without it the seed is derived from the
    /// corpus name.
    pub multisample_seed: Option<u64>,
    /// Attributes whose collocation frequency data is precomputed per shard.
    pub coll_attrs: Vec<String>,
}

impl Default for CorporaConfig {
    fn default() -> Self {
        CorporaConfig {
            registry_dir: PathBuf::from("./corpora/registry"),
            split_corpora_dir: PathBuf::from("./corpora/split"),
            multisampled_corpora_dir: PathBuf::from("./corpora/multisampled"),
            multiproc_chunk_size: DEFAULT_CHUNK_SIZE,
            multisampled_subc_size: DEFAULT_SAMPLE_SIZE,
            default_num_samples: DEFAULT_NUM_SAMPLES,
            multisample_seed: None,
            coll_attrs: vec!["word".to_string(), "lemma".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_address: String,
    pub listen_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 8989,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub num_workers: usize,
    /// Positional attribute names of the vertical files, in column order.
    pub positional_attrs: Vec<String>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        WorkersConfig {
            num_workers: 4,
            positional_attrs: vec!["word".to_string(), "lemma".to_string(), "tag".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_max_items: usize,
    /// Aggregate queries stop waiting after this many seconds and answer
    /// with what has been merged so far.
    pub gather_timeout_secs: Option<u64>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            default_max_items: DEFAULT_MAX_ITEMS,
            gather_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default)]
    pub corpora: CorporaConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl SwarmConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SwarmError::Config(format!("failed to read config file '{}': {}", path.display(), e))
        })?;
        toml::from_str(&contents).map_err(|e| {
            SwarmError::Config(format!("failed to parse TOML in '{}': {}", path.display(), e))
        })
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| SwarmError::Config(format!("failed to parse TOML: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.corpora.multiproc_chunk_size == 0 {
            return Err(SwarmError::Config("[corpora] multiproc_chunk_size must be positive".into()));
        }
        if self.corpora.multisampled_subc_size == 0 {
            return Err(SwarmError::Config("[corpora] multisampled_subc_size must be positive".into()));
        }
        if self.corpora.default_num_samples == 0 {
            return Err(SwarmError::Config("[corpora] default_num_samples must be positive".into()));
        }
        if self.workers.num_workers == 0 {
            return Err(SwarmError::Config("[workers] num_workers must be positive".into()));
        }
        if self.workers.positional_attrs.is_empty() {
            return Err(SwarmError::Config("[workers] positional_attrs must not be empty".into()));
        }
        if self.query.default_max_items == 0 {
            return Err(SwarmError::Config("[query] default_max_items must be positive".into()));
        }
        Ok(())
    }

    /// Environment variables override file values:
    /// `SWARM_REGISTRY_DIR`, `SWARM_SPLIT_CORPORA_DIR`,
    /// `SWARM_MULTISAMPLED_CORPORA_DIR`, `SWARM_LISTEN_PORT`, `SWARM_NUM_WORKERS`,
    /// `SWARM_GATHER_TIMEOUT_SECS`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = env::var("SWARM_REGISTRY_DIR") {
            self.corpora.registry_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("SWARM_SPLIT_CORPORA_DIR") {
            self.corpora.split_corpora_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("SWARM_MULTISAMPLED_CORPORA_DIR") {
            self.corpora.multisampled_corpora_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("SWARM_LISTEN_PORT") {
            if let Ok(port) = val.parse::<u16>() {
                self.server.listen_port = port;
            }
        }
        if let Ok(val) = env::var("SWARM_NUM_WORKERS") {
            if let Ok(n) = val.parse::<usize>() {
                self.workers.num_workers = n;
            }
        }
        if let Ok(val) = env::var("SWARM_GATHER_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.query.gather_timeout_secs = Some(secs);
            }
        }
        self
    }

    /// Path of a corpus given its public identifier.
    pub fn registry_path(&self, corpus_id: &str) -> Result<PathBuf> {
        let id = Path::new(corpus_id);
        let plain = !corpus_id.is_empty()
            && id.components().count() == 1
            && matches!(id.components().next(), Some(Component::Normal(_)));
        if !plain {
            return Err(SwarmError::Validation(format!("invalid corpus id '{}'", corpus_id)));
        }
        Ok(self.corpora.registry_dir.join(id))
    }

    pub fn gather_timeout(&self) -> Option<Duration> {
        self.query.gather_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = SwarmConfig::from_toml_str("").unwrap();
        assert_eq!(config.corpora.multiproc_chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.corpora.default_num_samples, 30);
        assert_eq!(config.query.default_max_items, 100);
        assert_eq!(config.workers.num_workers, 4);
        assert!(config.gather_timeout().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_sections() {
        let config = SwarmConfig::from_toml_str(
            r#"
[corpora]
registry_dir = "/data/registry"
multiproc_chunk_size = 5000
coll_attrs = ["lemma"]

[query]
gather_timeout_secs = 30
"#,
        )
        .unwrap();
        assert_eq!(config.corpora.registry_dir, PathBuf::from("/data/registry"));
        assert_eq!(config.corpora.multiproc_chunk_size, 5000);
        assert_eq!(config.corpora.coll_attrs, vec!["lemma"]);
        assert_eq!(config.corpora.multisampled_subc_size, DEFAULT_SAMPLE_SIZE);
        assert_eq!(config.gather_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_validation_rejects_zero_sizes() {
        let mut config = SwarmConfig::default();
        config.corpora.multiproc_chunk_size = 0;
        assert!(matches!(config.validate(), Err(SwarmError::Config(_))));

        let mut config = SwarmConfig::default();
        config.workers.num_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(
            SwarmConfig::from_toml_str("[corpora\nregistry_dir = 1"),
            Err(SwarmError::Config(_))
        ));
    }

    #[test]
    fn test_registry_path_rejects_traversal() {
        let config = SwarmConfig::from_toml_str("[corpora]\nregistry_dir = \"/reg\"").unwrap();
        assert_eq!(config.registry_path("syn2020").unwrap(), PathBuf::from("/reg/syn2020"));
        assert!(config.registry_path("../etc").is_err());
        assert!(config.registry_path("a/b").is_err());
        assert!(config.registry_path("").is_err());
    }
}
