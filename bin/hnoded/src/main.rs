use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hnode_common::logging;
use hnode_config::Config;
use hnode_db::{HeaderDatabase, HeaderDb, MemHeaderDb};
use hnode_index::{validate_start_height, StartTip};
use hnode_net::explorer::decode_header_hex;
use hnode_net::{BitcoindClient, ExplorerClient};
use hnode_node::{HeaderNode, NodeOptions};
use hnode_primitives::NetworkParams;
use hnode_sync::DriverConfig;
use tokio::sync::{mpsc, watch};
use tracing::*;

use crate::args::Args;
use crate::peer::BitcoindPeerSource;

mod args;
mod peer;
mod rpc_server;

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");
        return Err(e);
    }

    Ok(())
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(&args)?;
    args.override_config(&mut config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hnode-rt")
        .build()
        .expect("init: build rt");

    logging::init(logging::LoggerConfig::new("hnoded".to_string()));

    let params = NetworkParams::new(config.node.network);
    runtime.block_on(run(config, params))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading config {}", args.config.display()))?;
    let config: Config = toml::from_str(&raw).context("parsing config")?;
    Ok(config)
}

async fn run(config: Config, params: NetworkParams) -> anyhow::Result<()> {
    let start = resolve_start_tip(&config, &params).await?;
    let options = NodeOptions {
        checkpoints: config.node.checkpoints,
        start,
        driver: DriverConfig::new(
            config.sync.response_timeout_ms,
            config.sync.orphan_timeout_ms,
            config.sync.max_orphan_rounds,
        ),
    };

    if config.node.memory {
        let db = Arc::new(MemHeaderDb::new());
        serve(db, params, config, options).await
    } else {
        let db = Arc::new(HeaderDb::open(&config.node.prefix).context("opening header store")?);
        serve(db, params, config, options).await
    }
}

/// Resolves the fast-sync anchor: raw headers from the config, or an
/// explorer lookup when only a height is given.  Fails closed before any
/// network round when the height itself is unacceptable.
async fn resolve_start_tip(
    config: &Config,
    params: &NetworkParams,
) -> anyhow::Result<Option<StartTip>> {
    if let Some([prev_hex, start_hex]) = &config.node.start_tip {
        let height = config
            .node
            .start_height
            .context("start_tip also needs start_height for the anchor height")?;
        validate_start_height(height, params)?;
        let prev = decode_header_hex(prev_hex.trim())?;
        let start = decode_header_hex(start_hex.trim())?;
        return Ok(Some(StartTip::new(prev, start, height)?));
    }

    if let Some(height) = config.node.start_height {
        validate_start_height(height, params)?;
        let timeout = Duration::from_millis(config.explorer.timeout_ms);
        let client = match &config.explorer.url {
            Some(url) => ExplorerClient::new(url.clone(), timeout),
            None => ExplorerClient::for_network(params.network, timeout)?,
        };
        info!(%height, "resolving start tip via explorer");
        let (prev, start) = client.start_tip(height).await?;
        return Ok(Some(StartTip::new(prev, start, height)?));
    }

    Ok(None)
}

async fn serve<D: HeaderDatabase>(
    db: Arc<D>,
    params: NetworkParams,
    config: Config,
    options: NodeOptions,
) -> anyhow::Result<()> {
    let node = HeaderNode::open(db, params, options)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Some(bitcoind) = &config.bitcoind_rpc {
        let client = BitcoindClient::new(
            bitcoind.rpc_url.clone(),
            &bitcoind.rpc_user,
            &bitcoind.rpc_password,
        );
        let (event_tx, event_rx) = mpsc::channel(256);
        let source = BitcoindPeerSource::new(client, event_tx);
        node.start_sync(Arc::new(source.clone()), event_rx);
        tokio::spawn(source.poll_task(bitcoind.poll_interval_ms, shutdown_rx.clone()));
    } else {
        warn!("no bitcoind endpoint configured; serving stored headers only");
    }

    let rpc_handle = rpc_server::start(node.clone(), &config.rpc).await?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    if let Err(e) = rpc_handle.stop() {
        warn!(err = %e, "rpc server already stopped");
    }
    node.close().await?;
    logging::finalize();
    Ok(())
}
