//! baker-rewards CLI: compute cycle rewards, resolve snapshots.

use baker_rewards::chain::{Cache, FetchConfig};
use baker_rewards::compute::{SnapshotResolution, SnapshotResolver};
use baker_rewards::network::NetworkParameters;
use baker_rewards::provider::{Provider, ProviderConfig, ProviderFactory};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Compute(args) => rt.block_on(run_compute(args)),
        Command::Snapshot(args) => rt.block_on(run_snapshot(args)),
    }
}

#[derive(Parser)]
#[command(name = "baker-rewards")]
#[command(author = "gorusys <goru.connector@outlook.com>")]
#[command(about = "Per-cycle baking rewards and delegator balances, cross-validated")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute reward records for a cycle (or range) and print them as JSON lines.
    Compute(ComputeArgs),
    /// Print the roll snapshot block level for a cycle.
    Snapshot(SnapshotArgs),
}

#[derive(Args)]
struct ChainArgs {
    /// MAINNET, ALPHANET or ZERONET.
    #[arg(long, default_value = "MAINNET")]
    network: String,
    /// JSON file overriding the network constants.
    #[arg(long)]
    network_config: Option<PathBuf>,
    /// rpc, prpc or mirror.
    #[arg(long, default_value = "rpc")]
    provider: Provider,
    #[arg(long, default_value = "127.0.0.1:8732")]
    node_url: String,
    /// Mirror base URL; repeat for fallbacks.
    #[arg(long = "mirror")]
    mirrors: Vec<String>,
    #[arg(long, default_value = "./data/cache")]
    cache_dir: PathBuf,
    #[arg(long)]
    no_cache: bool,
    #[arg(long)]
    offline: bool,
}

#[derive(Args)]
struct ComputeArgs {
    #[command(flatten)]
    chain: ChainArgs,
    /// Baker (delegate) address.
    #[arg(long)]
    baker: String,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    cycle: i64,
    /// Last cycle of an inclusive range starting at --cycle.
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    to_cycle: Option<i64>,
    /// Recompute on this provider and fail on any difference.
    #[arg(long)]
    validate_with: Option<Provider>,
}

#[derive(Args)]
struct SnapshotArgs {
    #[command(flatten)]
    chain: ChainArgs,
    #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
    cycle: i64,
}

fn network_params(args: &ChainArgs) -> Result<NetworkParameters, Box<dyn std::error::Error>> {
    let params = match &args.network_config {
        Some(path) => NetworkParameters::load_from_path(path)?,
        None => NetworkParameters::for_network(&args.network)?,
    };
    Ok(params)
}

async fn build_factory(
    args: &ChainArgs,
    providers: &[Provider],
) -> Result<ProviderFactory, Box<dyn std::error::Error>> {
    let cache = if args.no_cache {
        None
    } else {
        Some(Arc::new(Cache::open(args.cache_dir.join("cache.sqlite"))?))
    };
    let config = ProviderConfig {
        network: network_params(args)?,
        node_url: Some(args.node_url.clone()),
        mirrors: args.mirrors.clone(),
        fetch: FetchConfig {
            offline: args.offline,
            ..Default::default()
        },
    };
    Ok(ProviderFactory::new(config, providers, cache).await?)
}

async fn run_compute(args: ComputeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let last = args.to_cycle.unwrap_or(args.cycle);
    if last < args.cycle {
        return Err(format!("--to-cycle {} precedes --cycle {}", last, args.cycle).into());
    }
    let mut providers = vec![args.chain.provider];
    providers.extend(args.validate_with);
    let factory = build_factory(&args.chain, &providers).await?;
    let validator =
        factory.cross_validator(args.chain.provider, args.validate_with, &args.baker)?;
    info!(
        baker = %args.baker,
        primary = %args.chain.provider,
        validated = validator.validates(),
        "computing rewards"
    );
    for cycle in args.cycle..=last {
        let record = validator.compute(cycle).await?;
        println!("{}", serde_json::to_string(&record)?);
    }
    info!(requests = factory.request_count(), "compute complete");
    Ok(())
}

async fn run_snapshot(args: SnapshotArgs) -> Result<(), Box<dyn std::error::Error>> {
    let factory = build_factory(&args.chain, &[args.chain.provider]).await?;
    let port = factory.chain_port(args.chain.provider)?;
    let head = port.head().await?;
    let params = factory.params();
    let resolver = SnapshotResolver::new(&params);
    match resolver.resolve(port.as_ref(), args.cycle, head.level).await? {
        SnapshotResolution::Resolved(r) => println!("{}", r.block),
        SnapshotResolution::NotYetAvailable { snapshot_level, .. } => {
            println!(
                "not yet available (head {}, snapshot level {})",
                head.level, snapshot_level
            );
        }
    }
    Ok(())
}
