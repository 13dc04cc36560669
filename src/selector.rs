//! Cheapest faithful encoding for one pair of same-position blocks.

use std::path::Path;

use tracing::trace;

use crate::codec::DeltaCodec;
use crate::digest::block_fingerprint;
use crate::error::Result;
use crate::patch_format::BlockOp;
use crate::util;

/// Outcome of [`select_block`]: the tag plus how many bytes were staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub op: BlockOp,
    pub staged_bytes: u64,
}

/// Pick `copy`, `new` or `patch` for one block and stage its artifact.
///
/// Identical blocks stage nothing. Otherwise a delta is computed and kept only
/// when strictly smaller than the new block; ties go to the raw copy.
/// Codec failures propagate.
pub fn select_block<C: DeltaCodec + ?Sized>(
    codec: &C,
    old: &[u8],
    new: &[u8],
    delta_path: &Path,
    raw_path: &Path,
) -> Result<Selection> {
    if block_fingerprint(old) == block_fingerprint(new) {
        return Ok(Selection {
            op: BlockOp::CopyOld,
            staged_bytes: 0,
        });
    }

    let delta = codec.compute_delta(old, new)?;
    trace!(
        delta_len = delta.len(),
        new_len = new.len(),
        "computed block delta"
    );

    if delta.len() < new.len() {
        util::write_file(delta_path, &delta)?;
        Ok(Selection {
            op: BlockOp::Delta,
            staged_bytes: delta.len() as u64,
        })
    } else {
        util::write_file(raw_path, new)?;
        Ok(Selection {
            op: BlockOp::CopyNew,
            staged_bytes: new.len() as u64,
        })
    }
}
