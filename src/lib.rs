//! # localnet
//!
//! Run a local validator network and drive transfer load against it.
//!
//! The crate has two halves:
//! - [`cluster`]: a fixed set of validator nodes, initialized in order,
//!   connected in a full mesh, then run concurrently until cancellation or
//!   the first node failure.
//! - [`loadbot`]: one paced submit-and-confirm loop per funded account,
//!   sharing a bounded pool of RPC clients.
//!
//! Both are built on [`group::TaskGroup`], which gives every concurrent unit
//! a shared cancellation signal and reports the first failure.
//!
//! ## Example
//!
//! ```rust,no_run
//! use localnet::{Cluster, Environment, GethConfig, LocalnetConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = LocalnetConfig::default();
//!     let env = Arc::new(Environment::read("./localnet-env")?);
//!     let geth = GethConfig::from_settings(settings.resolve_geth()?, &settings);
//!     let cluster = Cluster::with_geth(env, geth)?;
//!     cluster.init().await?;
//!     cluster.run(&CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod cluster;
pub mod config;
pub mod error;
pub mod group;
pub mod loadbot;
pub mod rpc;

pub use account::{Account, AccountRole, Address};
pub use cluster::{Cluster, GethConfig, GethNode, Node, NodeInfo, NodeProcess, NodeSpec, NodeState};
pub use config::{EnvConfig, Environment, LoadBotSettings, LocalnetConfig};
pub use error::{Error, Result};
pub use group::TaskGroup;
pub use loadbot::{LoadBot, LoadBotConfig, Schedule, TransferPicker, WorkerState};
pub use rpc::{RpcClient, RpcClientConfig, TransactionClient, TransferJob};
