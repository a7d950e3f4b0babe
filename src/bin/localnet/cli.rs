//! CLI definition for localnet.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Local validator network runner and transfer load bot.
#[derive(Parser, Debug)]
#[command(name = "localnet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a localnet.toml settings file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize every validator data directory and write static peers.
    InitNodes(NodeArgs),

    /// Run the initialized validators until Ctrl-C or the first failure.
    Run(NodeArgs),

    /// Print the network identifier of every validator.
    NodeInfo(NodeArgs),

    /// Send paced transfers from every developer account.
    LoadBot(LoadBotArgs),
}

/// Arguments of the node commands.
#[derive(Args, Debug)]
pub struct NodeArgs {
    /// Environment directory containing env.json and genesis.json.
    pub envdir: PathBuf,

    /// Path to the geth binary.
    #[arg(long)]
    pub geth: Option<PathBuf>,
}

/// Arguments of the load bot command.
#[derive(Args, Debug)]
pub struct LoadBotArgs {
    /// Environment directory containing env.json.
    pub envdir: PathBuf,

    /// Target aggregate transactions per second.
    #[arg(long)]
    pub tps: Option<u32>,

    /// Number of RPC clients to open (at most 100).
    #[arg(long)]
    pub clients: Option<usize>,

    /// JSON-RPC endpoint.
    #[arg(long)]
    pub rpc_url: Option<String>,
}
