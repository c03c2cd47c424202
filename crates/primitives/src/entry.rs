//! Chain entries: headers annotated with height and cumulative work.

use arbitrary::Arbitrary;
use bitcoin::block::{Header, Version};
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::pow::Work;
use bitcoin::{BlockHash, CompactTarget, TxMerkleNode};

use crate::params::NetworkParams;

/// A header linked into the chain.
///
/// Carries everything contextual validation needs: the absolute height and
/// the cumulative work of the entry and all its ancestors.  Below the
/// historical point only the bare header is persisted, and entries rebuilt
/// from such rows carry a zero-work placeholder; that is fine because fork
/// choice only ever compares entries above the historical point.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChainEntry {
    header: Header,
    hash: BlockHash,
    height: u32,
    chainwork: Work,
}

impl ChainEntry {
    pub fn new(header: Header, height: u32, chainwork: Work) -> Self {
        let hash = header.block_hash();
        Self {
            header,
            hash,
            height,
            chainwork,
        }
    }

    /// The entry for the network's genesis block.
    pub fn genesis(params: &NetworkParams) -> Self {
        Self::new(params.genesis, 0, params.genesis.work())
    }

    /// Links `header` under `parent`, accumulating its work.
    pub fn from_parent(parent: &ChainEntry, header: Header) -> Self {
        let chainwork = parent.chainwork + header.work();
        Self::new(header, parent.height + 1, chainwork)
    }

    /// An entry with a zero-work placeholder, for headers whose ancestry is
    /// fixed by checkpoint and whose true cumulative work we never stored.
    pub fn with_zero_work(header: Header, height: u32) -> Self {
        Self::new(header, height, zero_work())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn hash(&self) -> &BlockHash {
        &self.hash
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn chainwork(&self) -> Work {
        self.chainwork
    }

    pub fn prev_hash(&self) -> &BlockHash {
        &self.header.prev_blockhash
    }

    /// The 80-byte consensus encoding of the header.
    pub fn raw_header(&self) -> [u8; 80] {
        encode_header(&self.header)
    }
}

/// Work of zero, the placeholder for historical rows.
pub fn zero_work() -> Work {
    Work::from_be_bytes([0; 32])
}

/// Consensus-encodes a header into its exact wire form.
pub fn encode_header(header: &Header) -> [u8; 80] {
    let buf = encode::serialize(header);
    buf.try_into().expect("entry: header not 80 bytes")
}

/// Decodes an 80-byte wire header.
pub fn decode_header(buf: &[u8; 80]) -> Result<Header, encode::Error> {
    encode::deserialize(buf)
}

impl<'a> Arbitrary<'a> for ChainEntry {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        let header = Header {
            version: Version::from_consensus(i32::arbitrary(u)?),
            prev_blockhash: BlockHash::from_byte_array(<[u8; 32]>::arbitrary(u)?),
            merkle_root: TxMerkleNode::from_byte_array(<[u8; 32]>::arbitrary(u)?),
            time: u32::arbitrary(u)?,
            bits: CompactTarget::from_consensus(u32::arbitrary(u)?),
            nonce: u32::arbitrary(u)?,
        };
        Ok(Self::new(header, u32::arbitrary(u)?, zero_work()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::NetworkParams;

    #[test]
    fn test_header_roundtrip() {
        let params = NetworkParams::main();
        let raw = encode_header(&params.genesis);
        let decoded = decode_header(&raw).unwrap();
        assert_eq!(decoded, params.genesis);
        assert_eq!(decoded.block_hash(), params.genesis_hash());
    }

    #[test]
    fn test_from_parent_accumulates_work() {
        let params = NetworkParams::regtest();
        let genesis = ChainEntry::genesis(&params);
        let child = ChainEntry::from_parent(&genesis, params.genesis);
        assert_eq!(child.height(), 1);
        assert!(child.chainwork() > genesis.chainwork());
    }
}
