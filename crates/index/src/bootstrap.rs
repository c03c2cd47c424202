//! Custom-start validation and the raw anchor pair.

use bitcoin::block::Header;
use hnode_primitives::NetworkParams;

use crate::errors::IndexError;

/// The two raw headers a fast-syncing node anchors on: the block at the
/// start height and its parent.
#[derive(Clone, Debug)]
pub struct StartTip {
    pub prev: Header,
    pub start: Header,
    pub height: u32,
}

impl StartTip {
    pub fn new(prev: Header, start: Header, height: u32) -> Result<Self, IndexError> {
        if start.prev_blockhash != prev.block_hash() {
            return Err(IndexError::BadStartTip(format!(
                "header at {} doesn't extend the supplied parent",
                height
            )));
        }
        Ok(Self {
            prev,
            start,
            height,
        })
    }
}

/// Checks a configured start height against the network's anchors.
///
/// The start must sit at or before the last retarget boundary preceding the
/// last checkpoint: difficulty recomputation needs an ancestor at the
/// boundary, and a later start would ask the validator for headers the node
/// will never possess.
pub fn validate_start_height(height: u32, params: &NetworkParams) -> Result<(), IndexError> {
    if height == 0 {
        return Err(IndexError::StartHeightZero);
    }

    let last_checkpoint = params.last_checkpoint();
    if last_checkpoint > 0 && height >= last_checkpoint {
        return Err(IndexError::StartPastCheckpoint {
            requested: height,
            last_checkpoint,
        });
    }

    let max = params.historical_point();
    if height > max {
        return Err(IndexError::StartHeightTooHigh {
            requested: height,
            max,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use hnode_test_utils::{checkpoint_params, quick_params, HeaderGen};

    use super::*;

    fn params_with_checkpoint_62() -> NetworkParams {
        let mut gen = HeaderGen::new(quick_params(25));
        gen.mine(62);
        checkpoint_params(&gen, &[62])
    }

    #[test]
    fn test_valid_start_heights() {
        let params = params_with_checkpoint_62();
        assert_eq!(params.historical_point(), 50);
        validate_start_height(50, &params).unwrap();
        validate_start_height(25, &params).unwrap();
        validate_start_height(1, &params).unwrap();
    }

    #[test]
    fn test_start_past_historical_point() {
        let params = params_with_checkpoint_62();
        let err = validate_start_height(55, &params).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("50"), "message should name the max: {msg}");
        assert!(msg.contains("retarget"), "message should say why: {msg}");
    }

    #[test]
    fn test_start_past_checkpoint() {
        let params = params_with_checkpoint_62();
        assert!(matches!(
            validate_start_height(70, &params).unwrap_err(),
            IndexError::StartPastCheckpoint { .. }
        ));
    }

    #[test]
    fn test_start_zero_refused() {
        let params = params_with_checkpoint_62();
        assert!(matches!(
            validate_start_height(0, &params).unwrap_err(),
            IndexError::StartHeightZero
        ));
    }

    #[test]
    fn test_no_checkpoints_means_no_custom_start() {
        let params = quick_params(25);
        assert!(matches!(
            validate_start_height(10, &params).unwrap_err(),
            IndexError::StartHeightTooHigh { max: 0, .. }
        ));
    }

    #[test]
    fn test_start_tip_must_link() {
        let mut gen = HeaderGen::new(quick_params(25));
        gen.mine(50);

        StartTip::new(gen.header_at(49), gen.header_at(50), 50).unwrap();
        assert!(matches!(
            StartTip::new(gen.header_at(48), gen.header_at(50), 50),
            Err(IndexError::BadStartTip(_))
        ));
    }
}
