//! Command line arguments for the `hnode-dbtool` binary.

use std::path::PathBuf;

use argh::FromArgs;

/// Args.
#[derive(FromArgs)]
pub(crate) struct Args {
    #[argh(
        option,
        description = "network name [main, test, regtest, simnet]",
        short = 'n'
    )]
    pub(crate) network: Option<String>,

    #[argh(option, description = "header store directory", short = 'd')]
    pub(crate) datadir: PathBuf,

    #[argh(subcommand)]
    pub(crate) subc: Subcommand,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum Subcommand {
    Tip(SubcTip),
    Header(SubcHeader),
    Locator(SubcLocator),
    Check(SubcCheck),
    Rewind(SubcRewind),
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "tip", description = "prints the stored tip")]
pub(crate) struct SubcTip {}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand, name = "header", description = "prints the row at a height")]
pub(crate) struct SubcHeader {
    #[argh(positional, description = "height to look up")]
    pub(crate) height: u32,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "locator",
    description = "prints the locator the node would send"
)]
pub(crate) struct SubcLocator {}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "check",
    description = "scans every row and verifies chain contiguity"
)]
pub(crate) struct SubcCheck {}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(
    subcommand,
    name = "rewind",
    description = "rewinds the store to a height (never below a start marker)"
)]
pub(crate) struct SubcRewind {
    #[argh(positional, description = "new tip height")]
    pub(crate) height: u32,
}
