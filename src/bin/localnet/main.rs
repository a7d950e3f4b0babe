//! localnet CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command, LoadBotArgs, NodeArgs};
use localnet::loadbot::{self, ClientFactory, LoadBotConfig};
use localnet::rpc::TransactionClient;
use localnet::{
    Cluster, Environment, Error, GethConfig, LocalnetConfig, RpcClient, RpcClientConfig,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("localnet v{}", env!("CARGO_PKG_VERSION"));

    let settings = match cli.config {
        Some(ref path) => LocalnetConfig::from_file(path)?,
        None => LocalnetConfig::default(),
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    let result = match cli.command {
        Command::InitNodes(args) => init_nodes(args, settings).await,
        Command::Run(args) => run(args, settings, &cancel).await,
        Command::NodeInfo(args) => node_info(args, settings).await,
        Command::LoadBot(args) => load_bot(args, settings, &cancel).await,
    };

    match result {
        Err(Error::Cancelled) => {
            info!("Stopped");
            Ok(())
        }
        other => Ok(other?),
    }
}

/// Build the cluster; `needs_geth` commands fail early without a binary.
fn cluster(
    args: NodeArgs,
    mut settings: LocalnetConfig,
    needs_geth: bool,
) -> localnet::Result<Cluster> {
    if args.geth.is_some() {
        settings.geth = args.geth;
    }
    let env = Arc::new(Environment::read(&args.envdir)?);
    let binary = if needs_geth {
        settings.resolve_geth()?
    } else {
        settings.geth_or_default()
    };
    Cluster::with_geth(env, GethConfig::from_settings(binary, &settings))
}

async fn init_nodes(args: NodeArgs, settings: LocalnetConfig) -> localnet::Result<()> {
    cluster(args, settings, true)?.init().await
}

async fn run(
    args: NodeArgs,
    settings: LocalnetConfig,
    cancel: &CancellationToken,
) -> localnet::Result<()> {
    let cluster = cluster(args, settings, true)?;
    info!("Cluster running. Press Ctrl+C to stop.");
    cluster.run(cancel).await
}

async fn node_info(args: NodeArgs, settings: LocalnetConfig) -> localnet::Result<()> {
    for info in cluster(args, settings, false)?.node_info().await? {
        println!("validator-{:02}: {}", info.index, info.identifier);
    }
    Ok(())
}

async fn load_bot(
    args: LoadBotArgs,
    settings: LocalnetConfig,
    cancel: &CancellationToken,
) -> localnet::Result<()> {
    let mut lb = settings.loadbot;
    if let Some(tps) = args.tps {
        lb.transactions_per_second = tps;
    }
    if let Some(clients) = args.clients {
        lb.client_count = clients;
    }
    if let Some(url) = args.rpc_url {
        lb.rpc_url = url;
    }
    if lb.client_count > loadbot::CLIENT_CAP {
        warn!(
            "Requested {} clients, capping at {}",
            lb.client_count,
            loadbot::CLIENT_CAP
        );
    }

    let env = Environment::read(&args.envdir)?;
    let rpc =
        RpcClientConfig::new(lb.rpc_url.clone(), lb.stable_token).with_comment(lb.comment.clone());
    let client_factory: ClientFactory =
        Arc::new(move || -> localnet::Result<Arc<dyn TransactionClient>> {
            Ok(Arc::new(RpcClient::new(rpc.clone())?))
        });

    let config = LoadBotConfig {
        accounts: env.developer_accounts().to_vec(),
        amount: u128::from(lb.amount),
        transactions_per_second: lb.transactions_per_second,
        client_count: lb.client_count,
        damping: lb.damping,
        client_factory,
        picker: None,
    };
    loadbot::start(cancel, config).await
}
