//! Offline inspection and maintenance for a header store.
//!
//! Run this with the node stopped; it opens the store directly.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context};
use hnode_chain::chain::ChainConfig;
use hnode_db::{HeaderDb, HeaderProvider, StoredBlock};
use hnode_index::{chain_locator, HeaderIndexer};
use hnode_primitives::{Network, NetworkParams};
use serde::Serialize;

use crate::args::{Args, Subcommand};

mod args;

fn main() {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("ERROR\n{e:?}");
        std::process::exit(1);
    }
}

fn main_inner(args: Args) -> anyhow::Result<()> {
    let db = HeaderDb::open(&args.datadir)
        .with_context(|| format!("opening store at {}", args.datadir.display()))?;

    match args.subc {
        Subcommand::Tip(_) => show_tip(&db),
        Subcommand::Header(subc) => show_header(&db, subc.height),
        Subcommand::Locator(_) => show_locator(&db),
        Subcommand::Check(_) => check_contiguity(&db),
        Subcommand::Rewind(subc) => rewind(db, resolve_network(args.network.as_deref())?, subc.height),
    }
}

fn resolve_network(name: Option<&str>) -> anyhow::Result<Network> {
    let Some(name) = name else {
        bail!("this subcommand needs --network");
    };
    Ok(Network::from_str(name)?)
}

/// One row, as printed.
#[derive(Serialize)]
struct RowView {
    height: u32,
    hash: String,
    prev_block: String,
    time: u32,
    bits: u32,
    kind: &'static str,
    chainwork: Option<String>,
}

impl RowView {
    fn new(height: u32, row: &StoredBlock) -> anyhow::Result<Self> {
        let header = row.header(height)?;
        let chainwork = match row {
            StoredBlock::Header(_) => None,
            StoredBlock::Entry { chainwork, .. } => Some(hex::encode(chainwork)),
        };
        Ok(Self {
            height,
            hash: row.block_hash().to_string(),
            prev_block: header.prev_blockhash.to_string(),
            time: header.time,
            bits: header.bits.to_consensus(),
            kind: if row.is_historical() { "header" } else { "entry" },
            chainwork,
        })
    }
}

fn show_tip(db: &HeaderDb) -> anyhow::Result<()> {
    let Some(tip) = db.chain_tip()? else {
        bail!("store has no rows");
    };
    show_header(db, tip)
}

fn show_header(db: &HeaderDb, height: u32) -> anyhow::Result<()> {
    let Some(row) = db.get_block(height)? else {
        bail!("no row at height {height}");
    };
    let view = RowView::new(height, &row)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn show_locator(db: &HeaderDb) -> anyhow::Result<()> {
    let Some(tip) = db.chain_tip()? else {
        bail!("store has no rows");
    };
    let floor = db.get_start_marker()?.unwrap_or(0);
    for hash in chain_locator(db, tip, floor)? {
        println!("{hash}");
    }
    Ok(())
}

/// Walks every row from the first height to the tip and verifies the
/// prev-hash links, the hash accelerator, and that no gaps exist.
fn check_contiguity(db: &HeaderDb) -> anyhow::Result<()> {
    let (Some(first), Some(tip)) = (db.first_height()?, db.chain_tip()?) else {
        bail!("store has no rows");
    };

    let mut prev_hash = None;
    for height in first..=tip {
        let Some(row) = db.get_block(height)? else {
            bail!("gap: no row at height {height}");
        };
        let header = row.header(height)?;
        let hash = row.block_hash();

        if let Some(prev) = prev_hash {
            if header.prev_blockhash != prev {
                bail!("broken link: row {height} doesn't extend row {}", height - 1);
            }
        }
        if db.get_hash(height)? != Some(hash) {
            bail!("hash accelerator out of sync at height {height}");
        }
        prev_hash = Some(hash);
    }

    println!("ok: {} rows, {first}..={tip}", tip - first + 1);
    Ok(())
}

/// Rewinds through the indexer so the start-marker guard applies.
fn rewind(db: HeaderDb, network: Network, height: u32) -> anyhow::Result<()> {
    let params = NetworkParams::new(network);
    let chain_config = ChainConfig::for_params(&params);
    let (indexer, _chain, _params) =
        HeaderIndexer::open(Arc::new(db), params, chain_config, None)?;

    indexer.reset_to_height(height)?;
    println!("rewound to {height}");
    Ok(())
}
