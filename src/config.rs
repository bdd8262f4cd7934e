//! Configuration management for Slidegate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, SlidegateError};
use crate::ratelimit::{IdentityConfig, DEFAULT_MAX, DEFAULT_WINDOW_SECS};
use crate::storage::ClusterConfig;

/// Prefix for environment overrides, e.g. `SLIDEGATE__LIMITER__MAX=10`.
const ENV_PREFIX: &str = "SLIDEGATE";

/// Main configuration for the Slidegate engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlidegateConfig {
    /// Admission settings
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// Counter store settings
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Hits allowed per window
    #[serde(default = "default_max")]
    pub max: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Do not expose limit/remaining/reset metadata
    #[serde(default)]
    pub disable_headers: bool,

    /// Replace identity keys with a placeholder in errors and logs
    #[serde(default)]
    pub redact_keys: bool,

    /// Give the hit back when an admitted request fails
    #[serde(default)]
    pub skip_failed_requests: bool,

    /// Give the hit back when an admitted request succeeds
    #[serde(default)]
    pub skip_successful_requests: bool,

    /// How callers are identified
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Upper bound on each store call
    #[serde(default)]
    pub store_timeout_ms: Option<u64>,

    /// Path to per-identity limit rules
    #[serde(default)]
    pub rules_path: Option<String>,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max: default_max(),
            window_secs: default_window_secs(),
            disable_headers: false,
            redact_keys: false,
            skip_failed_requests: false,
            skip_successful_requests: false,
            identity: IdentityConfig::default(),
            store_timeout_ms: None,
            rules_path: None,
        }
    }
}

fn default_max() -> u64 {
    DEFAULT_MAX
}

fn default_window_secs() -> u64 {
    u64::from(DEFAULT_WINDOW_SECS)
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Cluster,
}

/// Counter store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Interval between expiry sweeps in milliseconds
    #[serde(default = "default_gc_interval")]
    pub gc_interval_ms: u64,

    /// Gossip settings, used by the cluster backend
    #[serde(default)]
    pub cluster: ClusterSettings,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            gc_interval_ms: default_gc_interval(),
            cluster: ClusterSettings::default(),
        }
    }
}

impl StorageSettings {
    pub fn gc_interval(&self) -> Duration {
        Duration::from_millis(self.gc_interval_ms)
    }
}

fn default_gc_interval() -> u64 {
    1000
}

/// Gossip settings for the cluster store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSettings {
    /// Node identifier; random when unset
    #[serde(default)]
    pub node_id: Option<String>,

    /// Gossip listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Address advertised to peers; defaults to `listen_addr`
    #[serde(default)]
    pub advertise_addr: Option<SocketAddr>,

    /// Peers to bootstrap from
    #[serde(default)]
    pub seed_nodes: Vec<String>,

    #[serde(default = "default_cluster_id")]
    pub cluster_id: String,

    /// Gossip interval in milliseconds
    #[serde(default = "default_gossip_interval")]
    pub gossip_interval_ms: u64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            node_id: None,
            listen_addr: default_listen_addr(),
            advertise_addr: None,
            seed_nodes: Vec::new(),
            cluster_id: default_cluster_id(),
            gossip_interval_ms: default_gossip_interval(),
        }
    }
}

impl ClusterSettings {
    /// Build a cluster store configuration.
    pub fn to_cluster_config(&self, gc_interval: Duration) -> ClusterConfig {
        let defaults = ClusterConfig::default();
        ClusterConfig {
            node_id: self.node_id.clone().unwrap_or(defaults.node_id),
            listen_addr: self.listen_addr,
            advertise_addr: self.advertise_addr.unwrap_or(self.listen_addr),
            seed_nodes: self.seed_nodes.clone(),
            cluster_id: self.cluster_id.clone(),
            gossip_interval: Duration::from_millis(self.gossip_interval_ms),
            dead_node_grace_period: defaults.dead_node_grace_period,
            gc_interval,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 7946))
}

fn default_cluster_id() -> String {
    "slidegate".to_string()
}

fn default_gossip_interval() -> u64 {
    100
}

impl SlidegateConfig {
    /// Load configuration from an optional YAML file, then apply
    /// `SLIDEGATE__*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::with_name(path).format(config::FileFormat::Yaml),
            );
        }

        let config: SlidegateConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SlidegateError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: SlidegateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SlidegateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.max == 0 {
            return Err(SlidegateError::Config("limiter.max must be positive".to_string()));
        }
        if self.limiter.window_secs == 0 {
            return Err(SlidegateError::Config(
                "limiter.window_secs must be positive".to_string(),
            ));
        }
        if self.limiter.window_secs > u64::from(u32::MAX) {
            return Err(SlidegateError::Config(
                "limiter.window_secs is too large".to_string(),
            ));
        }
        if self.storage.gc_interval_ms == 0 {
            return Err(SlidegateError::Config(
                "storage.gc_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
