//! Per-network chain constants.
//!
//! Every node owns its own [`NetworkParams`] value and threads it by
//! reference; there are no process-wide singletons, so tests can construct
//! networks with whatever retarget interval and checkpoint set they need.

use std::fmt;
use std::str::FromStr;

use bitcoin::block::{Header, Version};
use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, CompactTarget, Target, TxMerkleNode};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// The networks we know how to speak to.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Test,
    Regtest,
    Simnet,
}

impl Network {
    /// Whether the start-height explorer bootstrap is available for this
    /// network.  Local test networks only accept raw start tips.
    pub fn has_explorer(&self) -> bool {
        matches!(self, Network::Main | Network::Test)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Network::Main => "main",
            Network::Test => "test",
            Network::Regtest => "regtest",
            Network::Simnet => "simnet",
        };
        f.write_str(s)
    }
}

impl FromStr for Network {
    type Err = UnknownNetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Network::Main),
            "test" | "testnet" => Ok(Network::Test),
            "regtest" => Ok(Network::Regtest),
            "simnet" => Ok(Network::Simnet),
            _ => Err(UnknownNetworkError(s.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown network {0:?}")]
pub struct UnknownNetworkError(String);

/// A trusted (height, hash) anchor asserted by the network params.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: BlockHash,
}

/// Chain constants for one network.
///
/// Fields are public so tests can assemble bespoke networks; the running
/// node only ever reads them.
#[derive(Clone, Debug)]
pub struct NetworkParams {
    pub network: Network,

    /// The hardcoded genesis header.
    pub genesis: Header,

    /// Highest (easiest) target any header may encode.
    pub pow_limit: Target,

    /// Compact encoding of `pow_limit`.
    pub pow_limit_bits: CompactTarget,

    /// Blocks between difficulty recomputations.  2016 on mainnet.
    pub retarget_interval: u32,

    /// Expected seconds between blocks.
    pub pow_target_spacing: u32,

    /// Expected seconds per retarget window.
    pub pow_target_timespan: u32,

    /// Whether a block arriving 2x spacing late may use the pow limit.
    pub allow_min_difficulty: bool,

    /// Whether the retarget computation is skipped entirely (regtest).
    pub no_pow_retargeting: bool,

    /// Built-in checkpoints, ascending by height.
    pub checkpoints: Vec<Checkpoint>,

    /// Height below which ancestry is considered fixed.  Normally the
    /// highest checkpoint; a custom start anchor lowers it to the start
    /// height.  Zero when there are no trusted anchors.
    pub last_checkpoint: u32,
}

impl NetworkParams {
    pub fn new(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Test => Self::test(),
            Network::Regtest => Self::regtest(),
            Network::Simnet => Self::simnet(),
        }
    }

    pub fn main() -> Self {
        Self {
            network: Network::Main,
            genesis: genesis_header(1231006505, 0x1d00ffff, 2083236893),
            pow_limit: Target::MAX_ATTAINABLE_MAINNET,
            pow_limit_bits: Target::MAX_ATTAINABLE_MAINNET.to_compact_lossy(),
            retarget_interval: 2016,
            pow_target_spacing: 600,
            pow_target_timespan: 14 * 24 * 60 * 60,
            allow_min_difficulty: false,
            no_pow_retargeting: false,
            checkpoints: parse_checkpoints(MAINNET_CHECKPOINTS),
            last_checkpoint: last_height(MAINNET_CHECKPOINTS),
        }
    }

    pub fn test() -> Self {
        Self {
            network: Network::Test,
            genesis: genesis_header(1296688602, 0x1d00ffff, 414098458),
            pow_limit: Target::MAX_ATTAINABLE_TESTNET,
            pow_limit_bits: Target::MAX_ATTAINABLE_TESTNET.to_compact_lossy(),
            retarget_interval: 2016,
            pow_target_spacing: 600,
            pow_target_timespan: 14 * 24 * 60 * 60,
            allow_min_difficulty: true,
            no_pow_retargeting: false,
            checkpoints: parse_checkpoints(TESTNET_CHECKPOINTS),
            last_checkpoint: last_height(TESTNET_CHECKPOINTS),
        }
    }

    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            genesis: genesis_header(1296688602, 0x207fffff, 2),
            pow_limit: Target::MAX_ATTAINABLE_REGTEST,
            pow_limit_bits: Target::MAX_ATTAINABLE_REGTEST.to_compact_lossy(),
            retarget_interval: 2016,
            pow_target_spacing: 600,
            pow_target_timespan: 14 * 24 * 60 * 60,
            allow_min_difficulty: true,
            no_pow_retargeting: true,
            checkpoints: Vec::new(),
            last_checkpoint: 0,
        }
    }

    pub fn simnet() -> Self {
        Self {
            network: Network::Simnet,
            genesis: genesis_header(1401292357, 0x207fffff, 2),
            pow_limit: Target::MAX_ATTAINABLE_REGTEST,
            pow_limit_bits: Target::MAX_ATTAINABLE_REGTEST.to_compact_lossy(),
            retarget_interval: 2016,
            pow_target_spacing: 600,
            pow_target_timespan: 14 * 24 * 60 * 60,
            allow_min_difficulty: true,
            no_pow_retargeting: true,
            checkpoints: Vec::new(),
            last_checkpoint: 0,
        }
    }

    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis.block_hash()
    }

    /// Height below which ancestry is fixed; see the field docs.
    pub fn last_checkpoint(&self) -> u32 {
        self.last_checkpoint
    }

    /// The hash a block at `height` must have, if `height` is checkpointed.
    pub fn checkpoint_at(&self, height: u32) -> Option<&BlockHash> {
        self.checkpoints
            .binary_search_by_key(&height, |c| c.height)
            .ok()
            .map(|i| &self.checkpoints[i].hash)
    }

    /// Largest retarget-interval multiple at or below the last checkpoint.
    ///
    /// Heights at or below this point store bare headers; everything above
    /// keeps its full chain entry so cumulative work survives a restart.
    pub fn historical_point(&self) -> u32 {
        let last = self.last_checkpoint();
        if last > 0 {
            last - (last % self.retarget_interval)
        } else {
            0
        }
    }

    /// Whether a block at `height` sits on a retarget boundary.
    pub fn is_retarget_height(&self, height: u32) -> bool {
        !self.no_pow_retargeting && height > 0 && height % self.retarget_interval == 0
    }

    /// Replaces the checkpoint set, keeping it sorted.  Test helper and
    /// future checkpoint-bump hook.
    pub fn with_checkpoints(mut self, mut checkpoints: Vec<Checkpoint>) -> Self {
        checkpoints.sort_by_key(|c| c.height);
        self.last_checkpoint = checkpoints.last().map(|c| c.height).unwrap_or(0);
        self.checkpoints = checkpoints;
        self
    }

    /// Pins a custom start anchor: the anchor joins the checkpoint map and
    /// becomes the effective last checkpoint, so the validator treats the
    /// injected block as fixed ancestry.
    pub fn anchor_at(mut self, height: u32, hash: BlockHash) -> Self {
        self.checkpoints.retain(|c| c.height != height);
        self.checkpoints.push(Checkpoint { height, hash });
        self.checkpoints.sort_by_key(|c| c.height);
        self.last_checkpoint = height;
        self
    }

    /// [`bitcoin::params::Params`] with our tunables applied, for the pow
    /// arithmetic helpers.  [`Params`](bitcoin::params::Params) is
    /// `non_exhaustive`, so we clone a stock value and overwrite the fields
    /// we own.
    pub fn btc_params(&self) -> bitcoin::params::Params {
        let mut p = match self.network {
            Network::Main => bitcoin::params::Params::MAINNET.clone(),
            Network::Test => bitcoin::params::Params::TESTNET.clone(),
            Network::Regtest | Network::Simnet => bitcoin::params::Params::REGTEST.clone(),
        };
        p.max_attainable_target = self.pow_limit;
        p.pow_target_spacing = self.pow_target_spacing as u64;
        p.pow_target_timespan = self.pow_target_timespan as u64;
        p.allow_min_difficulty_blocks = self.allow_min_difficulty;
        p.no_pow_retargeting = self.no_pow_retargeting;
        p
    }
}

/// Builds a genesis header from the per-network constants.  All Bitcoin
/// genesis blocks share the version, zero parent, and coinbase merkle root.
fn genesis_header(time: u32, bits: u32, nonce: u32) -> Header {
    Header {
        version: Version::from_consensus(1),
        prev_blockhash: BlockHash::all_zeros(),
        merkle_root: GENESIS_MERKLE_ROOT
            .parse::<TxMerkleNode>()
            .expect("params: genesis merkle root"),
        time,
        bits: CompactTarget::from_consensus(bits),
        nonce,
    }
}

fn last_height(table: &[(u32, &str)]) -> u32 {
    table.last().map(|(h, _)| *h).unwrap_or(0)
}

fn parse_checkpoints(table: &[(u32, &str)]) -> Vec<Checkpoint> {
    table
        .iter()
        .map(|(height, hash)| Checkpoint {
            height: *height,
            hash: hash.parse::<BlockHash>().expect("params: checkpoint hash"),
        })
        .collect()
}

const GENESIS_MERKLE_ROOT: &str =
    "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

const MAINNET_CHECKPOINTS: &[(u32, &str)] = &[
    (
        11111,
        "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d",
    ),
    (
        33333,
        "000000002dd5588a74784eaa7ab0507a18ad16a236e7b1ce69f00d7ddfb5d0a6",
    ),
    (
        74000,
        "0000000000573993a3c9e41ce34471c079dcf5f52a0e824a81e7f953b8661a20",
    ),
    (
        105000,
        "00000000000291ce28027faea320c8d2b054b2e0fe44a773f3eefb151d6bdc97",
    ),
    (
        134444,
        "00000000000005b12ffd4cd315cd34ffd4a594f430ac814c91184a0d42d2b0fe",
    ),
    (
        168000,
        "000000000000099e61ea72015e79632f216fe2cb33d7899acb35b75c8303b763",
    ),
    (
        193000,
        "000000000000059f452a5f7340de6682a977387c17010ff6e6c3bd83ca8b1317",
    ),
    (
        210000,
        "000000000000048b95347e83192f69cf0366076336c639f9b7228e9ba171342e",
    ),
    (
        216116,
        "00000000000001b4f4b433e81ee46494af945cf96014816a4e2370f11b23df4e",
    ),
    (
        225430,
        "00000000000001c108384350f74090433e7fcf79a606b8e797f065b130575932",
    ),
    (
        250000,
        "000000000000003887df1f29024b06fc2200b55f8af8f35453d7be294df2d214",
    ),
    (
        279000,
        "0000000000000001ae8c72a0b0c301f67e3afca10e819efa9041e458e9bd7e40",
    ),
    (
        295000,
        "00000000000000004d9b4ef50f0f9d686fd69db2e03af35a100370c64632a983",
    ),
];

const TESTNET_CHECKPOINTS: &[(u32, &str)] = &[(
    546,
    "000000002a936ca763904c3c35fce2f3556c559c0214345d31b1bcebf76acb70",
)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_genesis_hash() {
        let params = NetworkParams::main();
        assert_eq!(
            params.genesis_hash().to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }

    #[test]
    fn test_regtest_genesis_hash() {
        let params = NetworkParams::regtest();
        assert_eq!(
            params.genesis_hash().to_string(),
            "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206"
        );
    }

    #[test]
    fn test_historical_point() {
        let params = NetworkParams::main();
        // 295000 rounded down to a multiple of 2016.
        assert_eq!(params.historical_point(), 294336);

        let no_cp = NetworkParams::regtest();
        assert_eq!(no_cp.historical_point(), 0);
    }

    #[test]
    fn test_checkpoint_lookup() {
        let params = NetworkParams::main();
        assert!(params.checkpoint_at(11111).is_some());
        assert!(params.checkpoint_at(11112).is_none());
        assert_eq!(params.last_checkpoint(), 295000);
    }

    #[test]
    fn test_network_parse_roundtrip() {
        for net in [
            Network::Main,
            Network::Test,
            Network::Regtest,
            Network::Simnet,
        ] {
            assert_eq!(net.to_string().parse::<Network>().unwrap(), net);
        }
    }
}
