//! Header validation rules.
//!
//! Split the way the rules compose: [`check_header`] is a pure function of
//! the 80 bytes, [`contextual_check`] additionally needs the parent entry
//! and enough ancestry for the median-time-past and retarget rules.  Both
//! mutate nothing; the working chain decides what to do with the verdict.

use bitcoin::block::Header;
use bitcoin::{CompactTarget, Target};
use hnode_primitives::constants::MEDIAN_TIME_SPAN;
use hnode_primitives::{ChainEntry, NetworkParams};

use crate::errors::{InvalidHeaderError, ValidatorError};

/// Read access to already-linked entries, keyed by hash.  The working chain
/// implements this over its entry table.
pub trait ChainContext {
    fn entry_by_hash(&self, hash: &bitcoin::BlockHash) -> Option<&ChainEntry>;
}

/// Context-free checks: the encoded target is within the network limit and
/// the header's own hash meets it.
pub fn check_header(header: &Header, params: &NetworkParams) -> Result<(), InvalidHeaderError> {
    let target = Target::from_compact(header.bits);
    if target > params.pow_limit {
        return Err(InvalidHeaderError::BitsAboveLimit);
    }
    header
        .validate_pow(target)
        .map_err(|_| InvalidHeaderError::ProofOfWork)?;
    Ok(())
}

/// Contextual checks against `prev`.  On success returns the linked entry
/// with its cumulative work.
pub fn contextual_check<C: ChainContext>(
    prev: &ChainEntry,
    header: &Header,
    ctx: &C,
    params: &NetworkParams,
    checkpoints_enabled: bool,
) -> Result<ChainEntry, ValidatorError> {
    if header.prev_blockhash != *prev.hash() {
        return Err(InvalidHeaderError::BadPrevHash.into());
    }

    let mtp = median_time_past(prev, ctx);
    if header.time <= mtp {
        return Err(InvalidHeaderError::TimeTooOld {
            time: header.time,
            mtp,
        }
        .into());
    }

    let expected = expected_bits(prev, header.time, ctx, params)?;
    if header.bits != expected {
        return Err(InvalidHeaderError::WrongBits {
            got: header.bits.to_consensus(),
            expected: expected.to_consensus(),
        }
        .into());
    }

    let height = prev.height() + 1;
    if checkpoints_enabled {
        if let Some(want) = params.checkpoint_at(height) {
            if header.block_hash() != *want {
                return Err(InvalidHeaderError::FailedCheckpoint { height }.into());
            }
        }
    }

    Ok(ChainEntry::from_parent(prev, *header))
}

/// Median of the previous blocks' timestamps, `prev` included, up to the
/// usual window of 11.  Near the effective start fewer may exist; the
/// median is taken over whatever does.
pub fn median_time_past<C: ChainContext>(prev: &ChainEntry, ctx: &C) -> u32 {
    let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
    let mut cur = prev;
    for _ in 0..MEDIAN_TIME_SPAN {
        times.push(cur.header().time);
        match ctx.entry_by_hash(cur.prev_hash()) {
            Some(parent) => cur = parent,
            None => break,
        }
    }
    times.sort_unstable();
    times[times.len() / 2]
}

/// Computes the bits a child of `prev` must carry.
fn expected_bits<C: ChainContext>(
    prev: &ChainEntry,
    new_time: u32,
    ctx: &C,
    params: &NetworkParams,
) -> Result<CompactTarget, ValidatorError> {
    let height = prev.height() + 1;

    if params.is_retarget_height(height) {
        let first_height = height - params.retarget_interval;
        let first = ancestor(ctx, prev, first_height)
            .ok_or(ValidatorError::MissingAncestor(first_height))?;
        let timespan = prev.header().time.saturating_sub(first.header().time) as u64;
        let btc_params = params.btc_params();
        return Ok(CompactTarget::from_next_work_required(
            prev.header().bits,
            timespan,
            &btc_params,
        ));
    }

    if params.allow_min_difficulty && !params.no_pow_retargeting {
        // Testnet rule: a block arriving more than twice the target spacing
        // after its parent may use the pow limit for that one block.
        if new_time > prev.header().time + 2 * params.pow_target_spacing {
            return Ok(params.pow_limit_bits);
        }
        return Ok(last_non_minimum_bits(prev, ctx, params));
    }

    Ok(prev.header().bits)
}

/// Walks back from `prev` to the last block that didn't use min-difficulty
/// bits, stopping at a retarget boundary.  Walking off the retained window
/// yields the pow limit.
fn last_non_minimum_bits<C: ChainContext>(
    prev: &ChainEntry,
    ctx: &C,
    params: &NetworkParams,
) -> CompactTarget {
    let mut cur = prev;
    loop {
        if cur.height() % params.retarget_interval == 0
            || cur.header().bits != params.pow_limit_bits
        {
            return cur.header().bits;
        }
        match ctx.entry_by_hash(cur.prev_hash()) {
            Some(parent) => cur = parent,
            None => return params.pow_limit_bits,
        }
    }
}

/// The ancestor of `from` at exactly `height`, walking parent links.
fn ancestor<'a, C: ChainContext>(
    ctx: &'a C,
    from: &'a ChainEntry,
    height: u32,
) -> Option<&'a ChainEntry> {
    if height > from.height() {
        return None;
    }
    let mut cur = from;
    while cur.height() > height {
        cur = ctx.entry_by_hash(cur.prev_hash())?;
    }
    Some(cur)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bitcoin::BlockHash;
    use hnode_test_utils::{quick_params, HeaderGen};

    use super::*;

    struct MapContext(HashMap<BlockHash, ChainEntry>);

    impl MapContext {
        fn from_gen(gen: &HeaderGen) -> Self {
            Self(
                gen.entries()
                    .iter()
                    .map(|e| (*e.hash(), e.clone()))
                    .collect(),
            )
        }
    }

    impl ChainContext for MapContext {
        fn entry_by_hash(&self, hash: &BlockHash) -> Option<&ChainEntry> {
            self.0.get(hash)
        }
    }

    #[test]
    fn test_valid_chain_accepted() {
        let params = quick_params(25);
        let mut gen = HeaderGen::new(params.clone());
        gen.mine(30);

        let ctx = MapContext::from_gen(&gen);
        for height in 1..=30u32 {
            let header = *gen.entry_at(height).header();
            let prev = gen.entry_at(height - 1);
            check_header(&header, &params).unwrap();
            let entry = contextual_check(prev, &header, &ctx, &params, true).unwrap();
            assert_eq!(entry.height(), height);
            assert_eq!(entry, *gen.entry_at(height));
        }
    }

    #[test]
    fn test_pow_rejected() {
        // A hard target this header's hash can't possibly meet.
        let params = quick_params(25);
        let mut gen = HeaderGen::new(params.clone());
        gen.mine(1);

        let mut header = *gen.entry_at(1).header();
        header.bits = CompactTarget::from_consensus(0x1d00ffff);
        assert_eq!(
            check_header(&header, &params),
            Err(InvalidHeaderError::ProofOfWork)
        );
    }

    #[test]
    fn test_bits_above_limit_rejected() {
        let mut params = quick_params(25);
        let mut gen = HeaderGen::new(params.clone());
        gen.mine(1);

        // Tighten the limit after mining so the mined bits now exceed it.
        params.pow_limit = Target::from_compact(CompactTarget::from_consensus(0x1d00ffff));
        let header = *gen.entry_at(1).header();
        assert_eq!(
            check_header(&header, &params),
            Err(InvalidHeaderError::BitsAboveLimit)
        );
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let params = quick_params(25);
        let mut gen = HeaderGen::new(params.clone());
        gen.mine(15);

        let ctx = MapContext::from_gen(&gen);
        let prev = gen.entry_at(15);
        let mut header = *gen.entry_at(15).header();
        header.prev_blockhash = *prev.hash();
        header.time = gen.entry_at(5).header().time;

        let err = contextual_check(prev, &header, &ctx, &params, true).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::Invalid(InvalidHeaderError::TimeTooOld { .. })
        ));
    }

    #[test]
    fn test_bad_prev_hash_rejected() {
        let params = quick_params(25);
        let mut gen = HeaderGen::new(params.clone());
        gen.mine(3);

        let ctx = MapContext::from_gen(&gen);
        let header = *gen.entry_at(3).header();
        // Validate against the wrong parent.
        let err = contextual_check(gen.entry_at(1), &header, &ctx, &params, true).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::Invalid(InvalidHeaderError::BadPrevHash)
        ));
    }

    #[test]
    fn test_checkpoint_mismatch_rejected() {
        let params = quick_params(25);
        let mut gen = HeaderGen::new(params.clone());
        gen.mine(10);

        // Assert a checkpoint at height 5 with the hash of a different block.
        let bogus = *gen.entry_at(4).hash();
        let params = params.with_checkpoints(vec![hnode_primitives::Checkpoint {
            height: 5,
            hash: bogus,
        }]);

        let ctx = MapContext::from_gen(&gen);
        let header = *gen.entry_at(5).header();
        let err = contextual_check(gen.entry_at(4), &header, &ctx, &params, true).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::Invalid(InvalidHeaderError::FailedCheckpoint { height: 5 })
        ));

        // With checkpoint enforcement off the same header is fine.
        contextual_check(gen.entry_at(4), &header, &ctx, &params, false).unwrap();
    }

    /// Mainnet-style params with a short interval; headers in these tests
    /// are never pow-checked, so the hard targets cost nothing to build.
    fn retarget_params(interval: u32) -> NetworkParams {
        let mut params = NetworkParams::main().with_checkpoints(vec![]);
        params.retarget_interval = interval;
        params.pow_target_timespan = interval * params.pow_target_spacing;
        params
    }

    /// A linked chain of unmined headers with the given bits and spacing.
    fn synthetic_chain(
        params: &NetworkParams,
        len: u32,
        spacing: u32,
        bits: CompactTarget,
    ) -> Vec<ChainEntry> {
        let mut header = params.genesis;
        header.bits = bits;
        let mut entries = vec![ChainEntry::new(header, 0, header.work())];
        for _ in 0..len {
            let prev = entries.last().unwrap();
            let mut h = *prev.header();
            h.prev_blockhash = *prev.hash();
            h.time = prev.header().time + spacing;
            entries.push(ChainEntry::from_parent(prev, h));
        }
        entries
    }

    fn map_ctx(entries: &[ChainEntry]) -> MapContext {
        MapContext(entries.iter().map(|e| (*e.hash(), e.clone())).collect())
    }

    #[test]
    fn test_retarget_boundary_enforced() {
        let params = retarget_params(8);
        let bits = CompactTarget::from_consensus(0x1c7fffff);

        // Blocks come twice as fast as the target spacing, so the boundary
        // block must tighten its target.
        let entries = synthetic_chain(&params, 7, params.pow_target_spacing / 2, bits);
        let ctx = map_ctx(&entries);
        let prev = &entries[7];

        let timespan = (prev.header().time - entries[0].header().time) as u64;
        let btc_params = params.btc_params();
        let expected = CompactTarget::from_next_work_required(bits, timespan, &btc_params);
        assert_ne!(expected, bits);

        let mut header = *prev.header();
        header.prev_blockhash = *prev.hash();
        header.time = prev.header().time + params.pow_target_spacing;
        header.bits = expected;
        contextual_check(prev, &header, &ctx, &params, true).unwrap();

        // Carrying the old bits across the boundary is rejected.
        let mut bad = header;
        bad.bits = bits;
        let err = contextual_check(prev, &bad, &ctx, &params, true).unwrap_err();
        assert!(matches!(
            err,
            ValidatorError::Invalid(InvalidHeaderError::WrongBits { .. })
        ));
    }

    #[test]
    fn test_retarget_needs_boundary_ancestor() {
        let params = retarget_params(8);
        let bits = CompactTarget::from_consensus(0x1c7fffff);
        let entries = synthetic_chain(&params, 7, params.pow_target_spacing, bits);

        // Context that only knows the last couple of blocks.
        let mut ctx = MapContext(HashMap::new());
        for e in &entries[6..] {
            ctx.0.insert(*e.hash(), e.clone());
        }

        let prev = &entries[7];
        let mut header = *prev.header();
        header.prev_blockhash = *prev.hash();
        header.time = prev.header().time + params.pow_target_spacing;
        let err = contextual_check(prev, &header, &ctx, &params, true).unwrap_err();
        assert!(matches!(err, ValidatorError::MissingAncestor(0)));
    }

    #[test]
    fn test_min_difficulty_rule() {
        let mut params = retarget_params(1000);
        params.allow_min_difficulty = true;
        let normal_bits = CompactTarget::from_consensus(0x1c7fffff);

        let entries = synthetic_chain(&params, 5, params.pow_target_spacing, normal_bits);
        let mut ctx = map_ctx(&entries);
        let prev = entries.last().unwrap();

        // A block more than 2x spacing late may use the pow limit, and in
        // fact must: normal bits are rejected for it.
        let mut late = *prev.header();
        late.prev_blockhash = *prev.hash();
        late.time = prev.header().time + 2 * params.pow_target_spacing + 1;
        late.bits = params.pow_limit_bits;
        let late_entry = contextual_check(prev, &late, &ctx, &params, true).unwrap();

        let mut late_bad = late;
        late_bad.bits = normal_bits;
        assert!(matches!(
            contextual_check(prev, &late_bad, &ctx, &params, true).unwrap_err(),
            ValidatorError::Invalid(InvalidHeaderError::WrongBits { .. })
        ));

        // An on-time child of the min-difficulty block must return to the
        // last non-minimum bits.
        ctx.0.insert(*late_entry.hash(), late_entry.clone());
        let mut child = late;
        child.prev_blockhash = *late_entry.hash();
        child.time = late.time + params.pow_target_spacing;
        child.bits = normal_bits;
        contextual_check(&late_entry, &child, &ctx, &params, true).unwrap();

        let mut child_bad = child;
        child_bad.bits = params.pow_limit_bits;
        assert!(matches!(
            contextual_check(&late_entry, &child_bad, &ctx, &params, true).unwrap_err(),
            ValidatorError::Invalid(InvalidHeaderError::WrongBits { .. })
        ));
    }
}
