//! Validator nodes: the process control surface and per-node bookkeeping.

use crate::account::Account;
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Control surface of one full-node process.
///
/// Implementations own whatever is needed to bootstrap, address and run a
/// node; the cluster only sequences these calls.
#[async_trait]
pub trait NodeProcess: Send + Sync {
    /// Bootstrap the node's data directory against the genesis descriptor.
    ///
    /// # Errors
    ///
    /// Returns `Error::Initialization` if bootstrap fails.
    async fn initialize(&self, genesis: &Path) -> Result<()>;

    /// The node's network identifier (an enode URL for geth).
    ///
    /// # Errors
    ///
    /// Returns `Error::Initialization` if called before [`initialize`](Self::initialize).
    async fn network_identifier(&self) -> Result<String>;

    /// Replace the node's static peer list.
    ///
    /// # Errors
    ///
    /// Returns `Error::Topology` if the list cannot be applied.
    async fn set_static_peers(&self, peers: &[String]) -> Result<()>;

    /// Run the node until it exits or `cancel` fires.
    ///
    /// On cancellation the node is shut down gracefully and `Ok(())` is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProcessRun` if the process exits abnormally.
    async fn run(&self, cancel: CancellationToken) -> Result<()>;
}

/// Static description of a validator node.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Node index (0-based, validator order).
    pub index: usize,
    /// Validator account that owns the node.
    pub account: Account,
    /// Process data directory.
    pub data_dir: PathBuf,
    /// Chain id the node joins.
    pub chain_id: u64,
}

impl NodeSpec {
    /// Human-readable node name used in logs.
    #[must_use]
    pub fn name(&self) -> String {
        format!("validator-{:02}", self.index)
    }
}

/// Lifecycle state of a cluster node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    /// Not initialized yet.
    Pending,
    /// Data directory bootstrapped.
    Initialized,
    /// Static peers pushed.
    Peered,
    /// Process running.
    Running,
    /// Process stopped cleanly.
    Stopped,
    /// Bootstrap, peering or the process failed.
    Failed(String),
}

/// A validator node owned by a [`Cluster`](super::Cluster).
pub struct Node {
    spec: NodeSpec,
    process: Arc<dyn NodeProcess>,
    state: Arc<RwLock<NodeState>>,
}

impl Node {
    pub(crate) fn new(spec: NodeSpec, process: Arc<dyn NodeProcess>) -> Self {
        Self {
            spec,
            process,
            state: Arc::new(RwLock::new(NodeState::Pending)),
        }
    }

    /// Node index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.spec.index
    }

    /// Node description.
    #[must_use]
    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> NodeState {
        self.state.read().await.clone()
    }

    pub(crate) fn process(&self) -> Arc<dyn NodeProcess> {
        Arc::clone(&self.process)
    }

    pub(crate) fn state_handle(&self) -> Arc<RwLock<NodeState>> {
        Arc::clone(&self.state)
    }

    pub(crate) async fn set_state(&self, state: NodeState) {
        *self.state.write().await = state;
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("spec", &self.spec).finish_non_exhaustive()
    }
}

/// Peer list for node `index`: every identifier except its own, in index order.
#[must_use]
pub fn full_mesh_peers(identifiers: &[String], index: usize) -> Vec<String> {
    identifiers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, id)| id.clone())
        .collect()
}
