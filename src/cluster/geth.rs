//! Geth-compatible validator node driven as a child process.

use super::node::{NodeProcess, NodeSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Instance directory geth keeps under the data directory.
const INSTANCE_DIR: &str = "geth";

/// Node key file inside the instance directory.
const NODEKEY_FILE: &str = "nodekey";

/// Static peer list file inside the instance directory.
const STATIC_NODES_FILE: &str = "static-nodes.json";

/// Keystore password file inside the data directory.
const PASSWORD_FILE: &str = "password";

/// Process log file inside the data directory.
const LOG_FILE: &str = "geth.log";

/// Number of stderr lines kept in error messages.
const STDERR_TAIL_LINES: usize = 10;

/// Settings shared by every geth node of a cluster.
#[derive(Debug, Clone)]
pub struct GethConfig {
    /// Path to the geth binary.
    pub binary: PathBuf,
    /// P2P port of node 0.
    pub p2p_base_port: u16,
    /// HTTP RPC port of node 0.
    pub rpc_base_port: u16,
    /// How long to wait after SIGTERM before killing the process.
    pub shutdown_grace: Duration,
}

impl GethConfig {
    /// Build from operator settings and a resolved binary path.
    #[must_use]
    pub fn from_settings(binary: PathBuf, settings: &crate::config::LocalnetConfig) -> Self {
        Self {
            binary,
            p2p_base_port: settings.p2p_base_port,
            rpc_base_port: settings.rpc_base_port,
            shutdown_grace: Duration::from_secs(settings.shutdown_grace_secs),
        }
    }

    /// Check that `nodes` consecutive ports fit above both base ports.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the last node's port would exceed 65535.
    pub fn validate(&self, nodes: usize) -> Result<()> {
        let Some(last) = nodes.checked_sub(1) else {
            return Ok(());
        };
        for (kind, base) in [("p2p", self.p2p_base_port), ("rpc", self.rpc_base_port)] {
            let fits = u16::try_from(last)
                .ok()
                .and_then(|i| base.checked_add(i))
                .is_some();
            if !fits {
                return Err(Error::Config(format!(
                    "{kind} base port {base} leaves no room for {nodes} nodes"
                )));
            }
        }
        Ok(())
    }
}

/// One validator node backed by a geth process.
#[derive(Debug, Clone)]
pub struct GethNode {
    spec: NodeSpec,
    config: GethConfig,
}

impl GethNode {
    /// Create a node; nothing touches the filesystem until [`NodeProcess::initialize`].
    #[must_use]
    pub fn new(spec: NodeSpec, config: GethConfig) -> Self {
        Self { spec, config }
    }

    /// P2P listening port of this node.
    #[must_use]
    pub fn p2p_port(&self) -> u16 {
        port_for(self.config.p2p_base_port, self.spec.index)
    }

    /// HTTP RPC port of this node.
    #[must_use]
    pub fn rpc_port(&self) -> u16 {
        port_for(self.config.rpc_base_port, self.spec.index)
    }

    fn instance_dir(&self) -> PathBuf {
        self.spec.data_dir.join(INSTANCE_DIR)
    }

    fn password_path(&self) -> PathBuf {
        self.spec.data_dir.join(PASSWORD_FILE)
    }

    /// Arguments for the long-running validator process.
    fn run_args(&self) -> Vec<String> {
        let address = self.spec.account.address().to_string();
        vec![
            "--datadir".into(),
            self.spec.data_dir.display().to_string(),
            "--networkid".into(),
            self.spec.chain_id.to_string(),
            "--port".into(),
            self.p2p_port().to_string(),
            "--nodiscover".into(),
            "--nousb".into(),
            "--syncmode".into(),
            "full".into(),
            "--mine".into(),
            "--miner.validator".into(),
            address.clone(),
            "--unlock".into(),
            address,
            "--password".into(),
            self.password_path().display().to_string(),
            "--allow-insecure-unlock".into(),
            "--http".into(),
            "--http.addr".into(),
            "127.0.0.1".into(),
            "--http.port".into(),
            self.rpc_port().to_string(),
            "--http.api".into(),
            "eth,net,web3,debug,admin,personal,txpool,istanbul".into(),
        ]
    }

    /// Run a short geth subcommand to completion.
    async fn exec(&self, args: &[&str]) -> std::result::Result<(), String> {
        let output = Command::new(&self.config.binary)
            .arg("--datadir")
            .arg(&self.spec.data_dir)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to spawn {}: {e}", self.config.binary.display()))?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        Err(format!(
            "geth {} exited with {}: {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            tail.join("\n")
        ))
    }

    async fn shutdown(&self, child: &mut Child) -> Result<()> {
        let name = self.spec.name();
        if let Some(pid) = child.id() {
            debug!("{name}: sending SIGTERM to pid {pid}");
            let sent = Command::new("kill")
                .arg("-TERM")
                .arg(pid.to_string())
                .status()
                .await;
            if let Err(e) = sent {
                warn!("{name}: failed to signal process: {e}");
            }
        }

        match tokio::time::timeout(self.config.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!("{name} stopped ({status})");
                Ok(())
            }
            Ok(Err(e)) => Err(Error::ProcessRun(format!("{name}: wait failed: {e}"))),
            Err(_) => {
                warn!(
                    "{name} did not exit within {:?}, killing",
                    self.config.shutdown_grace
                );
                child
                    .kill()
                    .await
                    .map_err(|e| Error::ProcessRun(format!("{name}: kill failed: {e}")))
            }
        }
    }
}

/// Port of node `index`; ranges are checked by [`GethConfig::validate`].
fn port_for(base: u16, index: usize) -> u16 {
    u16::try_from(index)
        .ok()
        .and_then(|i| base.checked_add(i))
        .unwrap_or(u16::MAX)
}

/// Enode URL for a node key listening on localhost.
#[must_use]
pub fn enode_url(key: &k256::ecdsa::SigningKey, port: u16) -> String {
    let point = key.verifying_key().to_encoded_point(false);
    format!(
        "enode://{}@127.0.0.1:{port}",
        hex::encode(&point.as_bytes()[1..])
    )
}

#[async_trait]
impl NodeProcess for GethNode {
    async fn initialize(&self, genesis: &Path) -> Result<()> {
        let name = self.spec.name();
        let init_err = |msg: String| Error::Initialization(format!("{name}: {msg}"));

        tokio::fs::create_dir_all(self.instance_dir())
            .await
            .map_err(|e| init_err(format!("create data dir: {e}")))?;

        tokio::fs::write(
            self.instance_dir().join(NODEKEY_FILE),
            self.spec.account.private_key_hex(),
        )
        .await
        .map_err(|e| init_err(format!("write nodekey: {e}")))?;

        tokio::fs::write(self.password_path(), "")
            .await
            .map_err(|e| init_err(format!("write password file: {e}")))?;

        let key_file = self.spec.data_dir.join("validator.key");
        tokio::fs::write(&key_file, self.spec.account.private_key_hex())
            .await
            .map_err(|e| init_err(format!("write key file: {e}")))?;
        let password = self.password_path().display().to_string();
        let key_path = key_file.display().to_string();
        let imported = self
            .exec(&["account", "import", "--password", &password, &key_path])
            .await;
        if let Err(e) = tokio::fs::remove_file(&key_file).await {
            warn!("{name}: failed to remove key file: {e}");
        }
        imported.map_err(init_err)?;

        let genesis = genesis.display().to_string();
        self.exec(&["init", &genesis]).await.map_err(init_err)?;

        debug!("{name}: initialized in {}", self.spec.data_dir.display());
        Ok(())
    }

    async fn network_identifier(&self) -> Result<String> {
        let path = self.instance_dir().join(NODEKEY_FILE);
        let hex_key = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Initialization(format!(
                "{}: node not initialized ({}: {e})",
                self.spec.name(),
                path.display()
            ))
        })?;
        let key = crate::account::parse_private_key(hex_key.trim())?;
        Ok(enode_url(&key, self.p2p_port()))
    }

    async fn set_static_peers(&self, peers: &[String]) -> Result<()> {
        let name = self.spec.name();
        let json = serde_json::to_string_pretty(peers)
            .map_err(|e| Error::Topology(format!("{name}: {e}")))?;
        tokio::fs::write(self.instance_dir().join(STATIC_NODES_FILE), json)
            .await
            .map_err(|e| Error::Topology(format!("{name}: write static nodes: {e}")))
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let name = self.spec.name();
        let log = std::fs::File::create(self.spec.data_dir.join(LOG_FILE))
            .map_err(|e| Error::ProcessRun(format!("{name}: open log file: {e}")))?;
        let log_err = log
            .try_clone()
            .map_err(|e| Error::ProcessRun(format!("{name}: open log file: {e}")))?;

        let mut child = Command::new(&self.config.binary)
            .args(self.run_args())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ProcessRun(format!("{name}: spawn failed: {e}")))?;

        info!(
            "{name} running (p2p {}, rpc {})",
            self.p2p_port(),
            self.rpc_port()
        );

        tokio::select! {
            status = child.wait() => {
                let status = status
                    .map_err(|e| Error::ProcessRun(format!("{name}: wait failed: {e}")))?;
                if status.success() {
                    info!("{name} exited");
                    Ok(())
                } else {
                    Err(Error::ProcessRun(format!("{name} exited with {status}")))
                }
            }
            () = cancel.cancelled() => self.shutdown(&mut child).await,
        }
    }
}
