//! Gossip-backed counter store using Chitchat.
//!
//! Every node publishes the records it writes into its own chitchat state.
//! Reads look at all live nodes and take the most recent unexpired write,
//! so the store behaves like a last-writer-wins register per key. Two nodes
//! admitting the same identity at the same moment may both win; the limiter
//! tolerates that imprecision.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chitchat::transport::UdpTransport;
use chitchat::{spawn_chitchat, ChitchatConfig, ChitchatHandle, ChitchatId, FailureDetectorConfig};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::{expires_at, is_expired, spawn_sweeper, Storage, StoreError};
use crate::clock::{Clock, SystemClock};

const KEY_PREFIX: &str = "record|";

/// Configuration for a cluster store node.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Unique node identifier.
    pub node_id: String,
    /// The address to listen on for gossip.
    pub listen_addr: SocketAddr,
    /// The address to advertise to other nodes.
    pub advertise_addr: SocketAddr,
    /// Seed nodes to bootstrap cluster membership.
    pub seed_nodes: Vec<String>,
    /// Cluster identifier (nodes must have matching cluster IDs).
    pub cluster_id: String,
    /// How often to gossip with peers.
    pub gossip_interval: Duration,
    /// Grace period before a dead node's state is dropped.
    pub dead_node_grace_period: Duration,
    /// How often this node deletes its own expired records.
    pub gc_interval: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let default_addr = SocketAddr::from(([0, 0, 0, 0], 7946));
        Self {
            node_id: uuid::Uuid::new_v4().to_string(),
            listen_addr: default_addr,
            advertise_addr: default_addr,
            seed_nodes: Vec::new(),
            cluster_id: "slidegate".to_string(),
            gossip_interval: Duration::from_millis(100),
            dead_node_grace_period: Duration::from_secs(3600),
            gc_interval: Duration::from_secs(1),
        }
    }
}

/// One record version as published in gossip state.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GossipValue {
    written_ms: i64,
    expires_at: u32,
    value: Vec<u8>,
}

impl GossipValue {
    /// Format: "{written_ms}|{expires_at}|{base64}"
    fn to_gossip(&self) -> String {
        format!(
            "{}|{}|{}",
            self.written_ms,
            self.expires_at,
            BASE64.encode(&self.value)
        )
    }

    fn from_gossip(raw: &str) -> Result<Self, StoreError> {
        let mut parts = raw.splitn(3, '|');
        let malformed = || StoreError::Backend(format!("malformed gossip value: {raw}"));

        let written_ms = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let expires_at = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let value = parts
            .next()
            .ok_or_else(malformed)
            .and_then(|p| BASE64.decode(p).map_err(|e| StoreError::Backend(e.to_string())))?;

        Ok(Self {
            written_ms,
            expires_at,
            value,
        })
    }
}

struct Shared {
    handle: ChitchatHandle,
    /// Keys this node has published, with their expiry
    written: Mutex<HashMap<String, u32>>,
    clock: Arc<dyn Clock>,
}

impl Shared {
    async fn purge_expired(&self) -> usize {
        let now = self.clock.now_secs();
        let candidates = self.expired_keys(now);
        if candidates.is_empty() {
            return 0;
        }
        self.remove_expired(candidates, now).await
    }

    /// Keys this node published that are expired at `now`.
    fn expired_keys(&self, now: u32) -> Vec<String> {
        self.written
            .lock()
            .iter()
            .filter(|(_, exp)| is_expired(**exp, now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Delete the candidates that are still expired from this node's state.
    async fn remove_expired(&self, candidates: Vec<String>, now: u32) -> usize {
        let chitchat_arc = self.handle.chitchat();
        let mut chitchat = chitchat_arc.lock().await;
        let mut written = self.written.lock();
        let mut removed = 0;
        for key in candidates {
            let still_expired = written
                .get(&key)
                .map(|exp| is_expired(*exp, now))
                .unwrap_or(false);
            if still_expired {
                chitchat.self_node_state().delete(&key);
                written.remove(&key);
                removed += 1;
            }
        }
        removed
    }
}

/// A counter store shared across nodes through chitchat gossip.
pub struct ClusterStore {
    node_id: String,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    sweeper: Option<JoinHandle<()>>,
    config: ClusterConfig,
}

impl std::fmt::Debug for ClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterStore")
            .field("node_id", &self.node_id)
            .field("config", &self.config)
            .finish()
    }
}

impl ClusterStore {
    /// Join (or found) a cluster and start gossiping.
    pub async fn start(config: ClusterConfig) -> Result<Self, StoreError> {
        Self::start_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn start_with_clock(
        config: ClusterConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        info!(
            node_id = %config.node_id,
            listen_addr = %config.listen_addr,
            advertise_addr = %config.advertise_addr,
            seed_nodes = ?config.seed_nodes,
            cluster_id = %config.cluster_id,
            "Starting cluster store node"
        );

        let chitchat_id = ChitchatId {
            node_id: config.node_id.clone(),
            generation_id: 0,
            gossip_advertise_addr: config.advertise_addr,
        };

        let chitchat_config = ChitchatConfig {
            chitchat_id,
            cluster_id: config.cluster_id.clone(),
            gossip_interval: config.gossip_interval,
            listen_addr: config.listen_addr,
            seed_nodes: config.seed_nodes.clone(),
            failure_detector_config: FailureDetectorConfig {
                initial_interval: config.gossip_interval,
                ..Default::default()
            },
            marked_for_deletion_grace_period: config.dead_node_grace_period,
            catchup_callback: None,
            extra_liveness_predicate: None,
        };

        let transport = UdpTransport;
        let handle = spawn_chitchat(chitchat_config, Vec::new(), &transport)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to start gossip: {e}")))?;

        let shared = Arc::new(Shared {
            handle,
            written: Mutex::new(HashMap::new()),
            clock,
        });

        let (shutdown, rx) = watch::channel(false);
        let weak = Arc::downgrade(&shared);
        let sweeper = spawn_sweeper("cluster", config.gc_interval, rx, move || {
            let weak = weak.clone();
            async move {
                if let Some(shared) = weak.upgrade() {
                    let removed = shared.purge_expired().await;
                    if removed > 0 {
                        debug!(removed = removed, "Deleted expired gossip records");
                    }
                }
            }
        });

        info!("Cluster store node started");

        Ok(Self {
            node_id: config.node_id.clone(),
            shared,
            shutdown,
            sweeper,
            config,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get the number of live nodes in the cluster.
    pub async fn live_node_count(&self) -> usize {
        let chitchat_arc = self.shared.handle.chitchat();
        let chitchat = chitchat_arc.lock().await;
        chitchat.live_nodes().count()
    }

    /// Delete this node's expired records now.
    pub async fn purge_expired(&self) -> usize {
        self.shared.purge_expired().await
    }

    /// Stop gossiping and leave the cluster.
    pub async fn shutdown(self) -> Result<(), StoreError> {
        info!(node_id = %self.node_id, "Shutting down cluster store node");
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.sweeper {
            // Wait for an in-flight sweep to drop its reference.
            handle.abort();
            let _ = handle.await;
        }

        let shared = Arc::try_unwrap(self.shared)
            .map_err(|_| StoreError::Backend("cluster store still in use".to_string()))?;
        shared
            .handle
            .shutdown()
            .await
            .map_err(|e| StoreError::Backend(format!("shutdown error: {e:?}")))
    }
}

#[async_trait]
impl Storage for ClusterStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let chitchat_key = format!("{KEY_PREFIX}{key}");
        let now = self.shared.clock.now_secs();

        let chitchat_arc = self.shared.handle.chitchat();
        let mut chitchat = chitchat_arc.lock().await;

        let mut raw_values: Vec<String> = Vec::new();
        if let Some(own) = chitchat.self_node_state().get(&chitchat_key) {
            raw_values.push(own.to_string());
        }
        for node_id in chitchat.live_nodes() {
            if node_id.node_id == self.node_id {
                continue;
            }
            if let Some(value) = chitchat
                .node_state(node_id)
                .and_then(|state| state.get(&chitchat_key))
            {
                raw_values.push(value.to_string());
            }
        }
        drop(chitchat);

        let mut freshest: Option<GossipValue> = None;
        for raw in &raw_values {
            let candidate = GossipValue::from_gossip(raw)?;
            if is_expired(candidate.expires_at, now) {
                continue;
            }
            if freshest
                .as_ref()
                .map_or(true, |f| candidate.written_ms > f.written_ms)
            {
                freshest = Some(candidate);
            }
        }

        trace!(
            versions = raw_values.len(),
            hit = freshest.is_some(),
            "Cluster store lookup"
        );

        Ok(freshest.map(|v| v.value))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let chitchat_key = format!("{KEY_PREFIX}{key}");
        let gossip = GossipValue {
            written_ms: chrono::Utc::now().timestamp_millis(),
            expires_at: expires_at(self.shared.clock.now_secs(), ttl),
            value: value.to_vec(),
        };

        let chitchat_arc = self.shared.handle.chitchat();
        let mut chitchat = chitchat_arc.lock().await;
        chitchat
            .self_node_state()
            .set(&chitchat_key, gossip.to_gossip());

        let mut written = self.shared.written.lock();
        if gossip.expires_at == 0 {
            written.remove(&chitchat_key);
        } else {
            written.insert(chitchat_key, gossip.expires_at);
        }
        Ok(())
    }
}
