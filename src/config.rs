//! Configuration for localnet.
//!
//! Two layers:
//! - [`Environment`]: the generated network (chain parameters and account
//!   keys) stored as `env.json` in the environment directory.
//! - [`LocalnetConfig`]: operator settings (binary paths, ports, load bot
//!   tuning) stored as TOML.

use crate::account::{Account, AccountRole, Address};
use alloy_primitives::address;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment file name inside the environment directory.
pub const ENV_FILE_NAME: &str = "env.json";

/// Genesis file name inside the environment directory.
pub const GENESIS_FILE_NAME: &str = "genesis.json";

/// Environment variable pointing at a blockchain checkout.
pub const BLOCKCHAIN_DIR_ENV: &str = "CELO_BLOCKCHAIN";

/// Binary name used when no node binary is configured.
pub const DEFAULT_GETH_BINARY: &str = "geth";

/// Comment sent with each load transfer, sized like an encrypted comment.
pub const DEFAULT_TRANSFER_COMMENT: &str =
    "need to proivde some long comment to make it similar to an encrypted comment";

/// Default fee currency / stable token contract address.
pub const DEFAULT_STABLE_TOKEN: &str = "0x000000000000000000000000000000000000d008";

/// Chain parameters of a generated environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvConfig {
    /// Chain id, used for replay protection.
    #[serde(default)]
    pub chain_id: u64,

    /// Number of initial validators.
    #[serde(default)]
    pub initial_validators: usize,

    /// Number of funded developer accounts.
    #[serde(default)]
    pub developer_accounts: usize,

    /// Seconds between blocks.
    #[serde(default)]
    pub block_period: u64,

    /// Epoch size in blocks.
    #[serde(default)]
    pub epoch: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        let mut cfg = Self {
            chain_id: 0,
            initial_validators: 0,
            developer_accounts: 0,
            block_period: 0,
            epoch: 0,
        };
        cfg.apply_defaults();
        cfg
    }
}

impl EnvConfig {
    /// Fill every unset (zero) field with its default.
    pub fn apply_defaults(&mut self) {
        if self.chain_id == 0 {
            self.chain_id = 10_203_040;
        }
        if self.initial_validators == 0 {
            self.initial_validators = 3;
        }
        if self.developer_accounts == 0 {
            self.developer_accounts = 10;
        }
        if self.block_period == 0 {
            self.block_period = 5;
        }
        if self.epoch == 0 {
            self.epoch = 17_280;
        }
    }
}

/// Account keys as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountKeys {
    #[serde(default)]
    admin: Option<String>,
    #[serde(default)]
    validators: Vec<String>,
    #[serde(default)]
    validator_groups: Vec<String>,
    #[serde(default)]
    developers: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvFile {
    config: EnvConfig,
    accounts: AccountKeys,
}

/// A generated network environment.
///
/// Supplies the ordered validator accounts, the developer accounts, per-node
/// data directories and the genesis path. Nothing in the cluster or the load
/// bot mutates it.
#[derive(Debug, Clone)]
pub struct Environment {
    dir: PathBuf,
    config: EnvConfig,
    admin: Option<Account>,
    validators: Vec<Account>,
    validator_groups: Vec<Account>,
    developers: Vec<Account>,
}

impl Environment {
    /// Build an environment in memory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, config: EnvConfig) -> Self {
        Self {
            dir: dir.into(),
            config,
            admin: None,
            validators: Vec::new(),
            validator_groups: Vec::new(),
            developers: Vec::new(),
        }
    }

    /// Add accounts, routed by role.
    #[must_use]
    pub fn with_accounts(mut self, accounts: impl IntoIterator<Item = Account>) -> Self {
        for account in accounts {
            match account.role() {
                AccountRole::Admin => self.admin = Some(account),
                AccountRole::Validator => self.validators.push(account),
                AccountRole::ValidatorGroup => self.validator_groups.push(account),
                AccountRole::Developer => self.developers.push(account),
            }
        }
        self
    }

    /// Read `env.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any key
    /// is invalid.
    pub fn read(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(ENV_FILE_NAME);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut file: EnvFile = serde_json::from_str(&content)?;
        file.config.apply_defaults();

        let parse_all = |keys: &[String], role| {
            keys.iter()
                .map(|k| Account::from_hex(k, role))
                .collect::<Result<Vec<_>>>()
        };

        let admin = file
            .accounts
            .admin
            .as_deref()
            .map(|k| Account::from_hex(k, AccountRole::Admin))
            .transpose()?;

        Ok(Self {
            config: file.config,
            admin,
            validators: parse_all(&file.accounts.validators, AccountRole::Validator)?,
            validator_groups: parse_all(
                &file.accounts.validator_groups,
                AccountRole::ValidatorGroup,
            )?,
            developers: parse_all(&file.accounts.developers, AccountRole::Developer)?,
            dir,
        })
    }

    /// Write `env.json` into the environment directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let keys = |accounts: &[Account]| {
            accounts
                .iter()
                .map(|a| format!("0x{}", a.private_key_hex()))
                .collect()
        };
        let file = EnvFile {
            config: self.config.clone(),
            accounts: AccountKeys {
                admin: self
                    .admin
                    .as_ref()
                    .map(|a| format!("0x{}", a.private_key_hex())),
                validators: keys(&self.validators),
                validator_groups: keys(&self.validator_groups),
                developers: keys(&self.developers),
            },
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(self.dir.join(ENV_FILE_NAME), json)?;
        Ok(())
    }

    /// Environment directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Chain parameters.
    #[must_use]
    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    /// Chain id.
    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    /// Path of the genesis descriptor shared by every validator.
    #[must_use]
    pub fn genesis_path(&self) -> PathBuf {
        self.dir.join(GENESIS_FILE_NAME)
    }

    /// Data directory of validator `index`.
    #[must_use]
    pub fn validator_datadir(&self, index: usize) -> PathBuf {
        self.dir.join(format!("validator-{index:02}"))
    }

    /// Validator accounts in index order.
    #[must_use]
    pub fn validator_accounts(&self) -> &[Account] {
        &self.validators
    }

    /// Validator group accounts.
    #[must_use]
    pub fn validator_group_accounts(&self) -> &[Account] {
        &self.validator_groups
    }

    /// Developer (load) accounts.
    #[must_use]
    pub fn developer_accounts(&self) -> &[Account] {
        &self.developers
    }

    /// Admin account, if the environment has one.
    #[must_use]
    pub fn admin_account(&self) -> Option<&Account> {
        self.admin.as_ref()
    }
}

/// Operator settings for a localnet run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalnetConfig {
    /// Path to the node binary. Falls back to `$CELO_BLOCKCHAIN/build/bin/geth`.
    #[serde(default)]
    pub geth: Option<PathBuf>,

    /// P2P port of validator 0; validator `i` listens on `p2p_base_port + i`.
    #[serde(default = "default_p2p_base_port")]
    pub p2p_base_port: u16,

    /// HTTP RPC port of validator 0; validator `i` serves on `rpc_base_port + i`.
    #[serde(default = "default_rpc_base_port")]
    pub rpc_base_port: u16,

    /// Seconds to wait for a node to exit after SIGTERM before killing it.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Load bot settings.
    #[serde(default)]
    pub loadbot: LoadBotSettings,
}

/// Load bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBotSettings {
    /// Target aggregate transactions per second.
    #[serde(default = "default_tps")]
    pub transactions_per_second: u32,

    /// Requested number of RPC clients (capped at 100).
    #[serde(default = "default_client_count")]
    pub client_count: usize,

    /// Amount transferred per transaction, in token base units.
    #[serde(default = "default_amount")]
    pub amount: u64,

    /// JSON-RPC endpoint the clients dial.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Token contract used for transfers and fees.
    #[serde(default = "default_stable_token")]
    pub stable_token: Address,

    /// Pacing damping factor applied to the per-account delay.
    #[serde(default = "default_damping")]
    pub damping: f64,

    /// Comment attached to every transfer; its length sets the call size.
    #[serde(default = "default_comment")]
    pub comment: String,
}

impl Default for LoadBotSettings {
    fn default() -> Self {
        Self {
            transactions_per_second: default_tps(),
            client_count: default_client_count(),
            amount: default_amount(),
            rpc_url: default_rpc_url(),
            stable_token: default_stable_token(),
            damping: default_damping(),
            comment: default_comment(),
        }
    }
}

impl Default for LocalnetConfig {
    fn default() -> Self {
        Self {
            geth: None,
            p2p_base_port: default_p2p_base_port(),
            rpc_base_port: default_rpc_base_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            loadbot: LoadBotSettings::default(),
        }
    }
}

impl LocalnetConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Resolve the node binary: explicit setting, then the checkout named by
    /// `$CELO_BLOCKCHAIN`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if neither yields an existing file.
    pub fn resolve_geth(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.geth {
            return Ok(path.clone());
        }
        let from_env = std::env::var_os(BLOCKCHAIN_DIR_ENV)
            .map(|dir| PathBuf::from(dir).join("build/bin/geth"));
        match from_env {
            Some(path) if path.exists() => {
                tracing::info!(
                    "Missing --geth flag, using {BLOCKCHAIN_DIR_ENV} derived path {}",
                    path.display()
                );
                Ok(path)
            }
            _ => Err(Error::Config("Missing --geth flag".to_string())),
        }
    }

    /// Node binary for commands that never execute it, such as reading node
    /// identities: the resolved path if there is one, else `geth` on `PATH`.
    #[must_use]
    pub fn geth_or_default(&self) -> PathBuf {
        self.resolve_geth()
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_GETH_BINARY))
    }
}

const fn default_p2p_base_port() -> u16 {
    30303
}

const fn default_rpc_base_port() -> u16 {
    8545
}

const fn default_shutdown_grace_secs() -> u64 {
    30
}

const fn default_tps() -> u32 {
    5
}

const fn default_client_count() -> usize {
    10
}

const fn default_amount() -> u64 {
    10_000_000
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

const fn default_stable_token() -> Address {
    address!("000000000000000000000000000000000000d008")
}

fn default_comment() -> String {
    DEFAULT_TRANSFER_COMMENT.to_string()
}

const fn default_damping() -> f64 {
    crate::loadbot::DEFAULT_PACING_DAMPING
}
