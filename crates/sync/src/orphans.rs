//! Orphan headers waiting for their ancestry.
//!
//! Batches are keyed by the hash they need connected first.  Each root gets
//! a bounded number of resolution rounds and a wall-clock lifetime, so a
//! peer replaying the same disconnected headers can't keep the driver in a
//! resolution loop.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bitcoin::block::Header;
use bitcoin::BlockHash;

use hnode_net::PeerId;

#[derive(Clone, Debug)]
pub struct OrphanBatch {
    pub headers: Vec<Header>,
    pub from: PeerId,
    rounds: u32,
    inserted_at: Instant,
}

pub struct OrphanPool {
    by_parent: HashMap<BlockHash, OrphanBatch>,
    max_rounds: u32,

    /// Roots that ran out of rounds.  Remembered so a peer replaying the
    /// same batch can't restart the chase; cleared by `expire`.
    ejected: HashMap<BlockHash, Instant>,
}

impl OrphanPool {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            by_parent: HashMap::new(),
            max_rounds,
            ejected: HashMap::new(),
        }
    }

    /// Stores a batch whose first header needs `parent` connected.
    ///
    /// Re-inserting the same root burns a resolution round; returns `false`
    /// once the root is out of rounds, at which point it is ejected and
    /// won't be chased again until its ejection ages out.
    pub fn insert(&mut self, parent: BlockHash, headers: Vec<Header>, from: PeerId) -> bool {
        if self.ejected.contains_key(&parent) {
            return false;
        }
        match self.by_parent.get_mut(&parent) {
            Some(batch) => {
                batch.rounds += 1;
                if batch.rounds >= self.max_rounds {
                    self.by_parent.remove(&parent);
                    self.ejected.insert(parent, Instant::now());
                    return false;
                }
                batch.headers = headers;
                batch.from = from;
                true
            }
            None => {
                self.by_parent.insert(
                    parent,
                    OrphanBatch {
                        headers,
                        from,
                        rounds: 0,
                        inserted_at: Instant::now(),
                    },
                );
                true
            }
        }
    }

    /// Removes and returns the batch waiting on `parent`, if any.
    pub fn take_ready(&mut self, parent: &BlockHash) -> Option<OrphanBatch> {
        self.by_parent.remove(parent)
    }

    /// Drops batches older than `ttl`, returning the parents they waited
    /// on.  Ejection records age out on the same clock.
    pub fn expire(&mut self, ttl: Duration) -> Vec<BlockHash> {
        let now = Instant::now();
        let stale: Vec<BlockHash> = self
            .by_parent
            .iter()
            .filter(|(_, b)| now.duration_since(b.inserted_at) >= ttl)
            .map(|(k, _)| *k)
            .collect();
        for key in &stale {
            self.by_parent.remove(key);
        }
        self.ejected
            .retain(|_, at| now.duration_since(*at) < ttl);
        stale
    }

    pub fn len(&self) -> usize {
        self.by_parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::hashes::Hash;

    use super::*;

    fn hash(n: u8) -> BlockHash {
        BlockHash::from_byte_array([n; 32])
    }

    #[test]
    fn test_rounds_cap() {
        let mut pool = OrphanPool::new(3);
        let parent = hash(1);

        assert!(pool.insert(parent, vec![], PeerId(1)));
        assert!(pool.insert(parent, vec![], PeerId(1)));
        assert!(pool.insert(parent, vec![], PeerId(1)));
        // The fourth attempt exhausts the rounds and ejects the root.
        assert!(!pool.insert(parent, vec![], PeerId(1)));
        assert!(pool.is_empty());

        // The ejection sticks: replaying the batch doesn't restart the
        // chase until the record ages out.
        assert!(!pool.insert(parent, vec![], PeerId(1)));
        pool.expire(Duration::ZERO);
        assert!(pool.insert(parent, vec![], PeerId(1)));
    }

    #[test]
    fn test_take_ready() {
        let mut pool = OrphanPool::new(3);
        pool.insert(hash(1), vec![], PeerId(7));

        assert!(pool.take_ready(&hash(2)).is_none());
        let batch = pool.take_ready(&hash(1)).unwrap();
        assert_eq!(batch.from, PeerId(7));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_expire() {
        let mut pool = OrphanPool::new(3);
        pool.insert(hash(1), vec![], PeerId(1));

        assert!(pool.expire(Duration::from_secs(60)).is_empty());
        assert_eq!(pool.expire(Duration::ZERO), vec![hash(1)]);
        assert!(pool.is_empty());
    }
}
