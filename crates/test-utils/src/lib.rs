//! Deterministic chains for tests.
//!
//! The generator grinds real proof of work against a regtest-style pow
//! limit, so produced headers pass the full validator, and everything is a
//! pure function of the params and the fork salt, so scenarios are
//! reproducible.

use bitcoin::block::Header;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{BlockHash, TxMerkleNode};
use hnode_primitives::{ChainEntry, Checkpoint, NetworkParams};

pub mod peers;

/// Regtest-style params with an adjustable retarget interval.
///
/// Retargeting is off (regtest semantics) so every block carries the pow
/// limit bits and mining stays cheap; the interval still drives the
/// historical point and start-height arithmetic.
pub fn quick_params(retarget_interval: u32) -> NetworkParams {
    let mut params = NetworkParams::regtest();
    params.retarget_interval = retarget_interval;
    params.pow_target_timespan = retarget_interval * params.pow_target_spacing;
    params.allow_min_difficulty = false;
    params.no_pow_retargeting = true;
    params
}

/// The generator's params with checkpoints asserted at the given heights of
/// an already-mined chain.
pub fn checkpoint_params(gen: &HeaderGen, heights: &[u32]) -> NetworkParams {
    let checkpoints = heights
        .iter()
        .map(|h| Checkpoint {
            height: *h,
            hash: gen.hash_at(*h),
        })
        .collect();
    gen.params().clone().with_checkpoints(checkpoints)
}

/// Deterministic header-chain generator.
#[derive(Clone)]
pub struct HeaderGen {
    params: NetworkParams,
    entries: Vec<ChainEntry>,
    salt: u64,
}

impl HeaderGen {
    pub fn new(params: NetworkParams) -> Self {
        Self::with_salt(params, 0)
    }

    /// A generator whose blocks differ from every other salt's, for building
    /// competing branches.
    pub fn with_salt(params: NetworkParams, salt: u64) -> Self {
        let genesis = ChainEntry::genesis(&params);
        Self {
            params,
            entries: vec![genesis],
            salt,
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn entry_at(&self, height: u32) -> &ChainEntry {
        &self.entries[height as usize]
    }

    pub fn header_at(&self, height: u32) -> Header {
        *self.entry_at(height).header()
    }

    pub fn hash_at(&self, height: u32) -> BlockHash {
        *self.entry_at(height).hash()
    }

    pub fn tip(&self) -> &ChainEntry {
        self.entries.last().expect("gen: never empty")
    }

    pub fn height(&self) -> u32 {
        self.tip().height()
    }

    /// Mines `count` blocks on the current tip.
    pub fn mine(&mut self, count: u32) {
        for _ in 0..count {
            let next = self.next_entry();
            self.entries.push(next);
        }
    }

    /// Headers over an inclusive height range, lowest first.
    pub fn headers(&self, start: u32, end: u32) -> Vec<Header> {
        (start..=end).map(|h| self.header_at(h)).collect()
    }

    /// A generator sharing this chain up to `height` whose further blocks
    /// diverge from ours.
    pub fn fork_at(&self, height: u32) -> Self {
        Self {
            params: self.params.clone(),
            entries: self.entries[..=height as usize].to_vec(),
            salt: self.salt + 1,
        }
    }

    fn next_entry(&self) -> ChainEntry {
        let prev = self.tip();
        let height = prev.height() + 1;

        let mut header = Header {
            version: bitcoin::block::Version::from_consensus(0x2000_0000),
            prev_blockhash: *prev.hash(),
            merkle_root: self.merkle_for(height),
            time: prev.header().time + self.params.pow_target_spacing,
            bits: self.params.pow_limit_bits,
            nonce: 0,
        };

        // Grind.  Against the regtest limit this takes a couple of tries.
        loop {
            if header.validate_pow(header.target()).is_ok() {
                break;
            }
            header.nonce += 1;
        }

        ChainEntry::from_parent(prev, header)
    }

    fn merkle_for(&self, height: u32) -> TxMerkleNode {
        let mut buf = Vec::with_capacity(20);
        buf.extend_from_slice(b"hnode-gen");
        buf.extend_from_slice(&self.salt.to_le_bytes());
        buf.extend_from_slice(&height.to_le_bytes());
        TxMerkleNode::from_byte_array(sha256d::Hash::hash(&buf).to_byte_array())
    }
}
