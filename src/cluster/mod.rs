//! Validator cluster orchestration.
//!
//! A [`Cluster`] owns one node per validator account of the environment and
//! drives them as a unit:
//!
//! ```text
//! init():  node 0 initialize -> id ... node N-1 initialize -> id
//!          node 0 set_static_peers(all but 0) ... node N-1 set_static_peers(all but N-1)
//! run():   [node 0 run] [node 1 run] ... [node N-1 run]   (one task group)
//! ```
//!
//! Initialization is strictly ordered and fails fast: an error at node `k`
//! returns before node `k + 1` is touched, and nodes already initialized are
//! left as they are. Running is concurrent: the first node to fail cancels
//! all others.

mod geth;
mod node;

pub use geth::{GethConfig, GethNode};
pub use node::{full_mesh_peers, Node, NodeProcess, NodeSpec, NodeState};

use crate::config::Environment;
use crate::error::{Error, Result};
use crate::group::TaskGroup;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Network identifier of one node, as reported by [`Cluster::node_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Node index.
    pub index: usize,
    /// Network identifier.
    pub identifier: String,
}

/// A fixed set of validator nodes managed together.
pub struct Cluster {
    env: Arc<Environment>,
    nodes: Vec<Node>,
}

impl Cluster {
    /// Create a cluster with one node per validator account.
    ///
    /// The node list is built here, once; its length never changes for the
    /// lifetime of the cluster.
    pub fn new<F>(env: Arc<Environment>, mut make_process: F) -> Self
    where
        F: FnMut(&NodeSpec) -> Arc<dyn NodeProcess>,
    {
        let nodes = env
            .validator_accounts()
            .iter()
            .enumerate()
            .map(|(index, account)| {
                let spec = NodeSpec {
                    index,
                    account: account.clone(),
                    data_dir: env.validator_datadir(index),
                    chain_id: env.chain_id(),
                };
                let process = make_process(&spec);
                Node::new(spec, process)
            })
            .collect();

        Self { env, nodes }
    }

    /// Create a cluster of geth processes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the port ranges cannot hold every validator.
    pub fn with_geth(env: Arc<Environment>, geth: GethConfig) -> Result<Self> {
        geth.validate(env.validator_accounts().len())?;
        Ok(Self::new(env, |spec| -> Arc<dyn NodeProcess> {
            Arc::new(GethNode::new(spec.clone(), geth.clone()))
        }))
    }

    /// The cluster's nodes in index order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The environment the cluster was built from.
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Initialize every node, then connect each to all the others.
    ///
    /// # Errors
    ///
    /// Returns the first `Error::Initialization` (remaining nodes untouched)
    /// or the first `Error::Topology` (remaining peering calls skipped).
    pub async fn init(&self) -> Result<()> {
        let genesis = self.env.genesis_path();
        let mut identifiers = Vec::with_capacity(self.nodes.len());

        info!("Initializing {} validator nodes", self.nodes.len());
        for node in &self.nodes {
            info!("{}> init", node.spec().name());
            let process = node.process();
            if let Err(e) = process.initialize(&genesis).await {
                node.set_state(NodeState::Failed(e.to_string())).await;
                return Err(e);
            }
            let identifier = match process.network_identifier().await {
                Ok(id) => id,
                Err(e) => {
                    node.set_state(NodeState::Failed(e.to_string())).await;
                    return Err(e);
                }
            };
            debug!("{}: {}", node.spec().name(), identifier);
            node.set_state(NodeState::Initialized).await;
            identifiers.push(identifier);
        }

        for node in &self.nodes {
            let peers = full_mesh_peers(&identifiers, node.index());
            debug!("{}> {} static peers", node.spec().name(), peers.len());
            if let Err(e) = node.process().set_static_peers(&peers).await {
                node.set_state(NodeState::Failed(e.to_string())).await;
                return Err(e);
            }
            node.set_state(NodeState::Peered).await;
        }

        info!("Validator nodes initialized and peered");
        Ok(())
    }

    /// Network identifier of every node, in index order.
    ///
    /// # Errors
    ///
    /// Returns the first lookup error, typically because the cluster has not
    /// been initialized.
    pub async fn node_info(&self) -> Result<Vec<NodeInfo>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            out.push(NodeInfo {
                index: node.index(),
                identifier: node.process().network_identifier().await?,
            });
        }
        Ok(out)
    }

    /// Run every node concurrently until `cancel` fires or one of them fails.
    ///
    /// # Errors
    ///
    /// Returns the first node failure (after all other nodes have been
    /// cancelled and have exited), or `Error::Cancelled` once every node has
    /// shut down after `cancel` fired.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Config("environment has no validator accounts".into()));
        }

        info!("Starting cluster");
        let mut group = TaskGroup::new("cluster", cancel);
        for node in &self.nodes {
            let name = node.spec().name();
            let process = node.process();
            let state = node.state_handle();
            info!("Starting {name}...");
            group.spawn(move |cancel| async move {
                *state.write().await = NodeState::Running;
                let result = process.run(cancel).await;
                *state.write().await = match &result {
                    Ok(()) | Err(Error::Cancelled) => NodeState::Stopped,
                    Err(e) => NodeState::Failed(e.to_string()),
                };
                debug!("{name} exited");
                result
            });
        }
        group.wait().await
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("env", &self.env.dir())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
