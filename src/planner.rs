//! Decides single-shot vs block-wise diffing for one modified file and drives
//! the block loop, staging artifacts as it goes.

use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::codec::DeltaCodec;
use crate::cursor::BlockCursorPair;
use crate::error::{IoResultExt, PatchError, Result};
use crate::patch_format::{ArtifactPaths, BlockOp, Operation};
use crate::selector::{select_block, Selection};
use crate::util;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePlan {
    pub operation: Operation,
    pub artifacts: usize,
    pub staged_bytes: u64,
}

impl FilePlan {
    fn stage(&mut self, bytes: u64) {
        self.artifacts += 1;
        self.staged_bytes += bytes;
    }

    fn record(&mut self, selection: Selection) {
        if selection.op != BlockOp::CopyOld {
            self.stage(selection.staged_bytes);
        }
    }
}

/// Plan the rebuild of `new_path` from `old_path`.
pub fn plan_file<C: DeltaCodec + ?Sized>(
    codec: &C,
    old_path: &Path,
    new_path: &Path,
    artifacts: &ArtifactPaths,
    block_size: u64,
) -> Result<FilePlan> {
    let old_len = std::fs::metadata(old_path).at(old_path)?.len();
    let new_len = std::fs::metadata(new_path).at(new_path)?.len();
    let mut old = util::open_file(old_path)?;
    let mut new = util::open_file(new_path)?;

    let streams = Streams {
        old_path,
        new_path,
        old_len,
        new_len,
    };
    plan_streams(codec, &mut old, &mut new, &streams, artifacts, block_size)
}

/// Lengths and display paths of an old/new stream pair.
#[derive(Debug, Clone, Copy)]
pub struct Streams<'a> {
    pub old_path: &'a Path,
    pub new_path: &'a Path,
    pub old_len: u64,
    pub new_len: u64,
}

/// Plan from two already-open streams of known length.
///
/// Block-wise plans always carry at least two tags. When the block loop would
/// produce fewer (new fits in one block while old does not, or old is empty)
/// the new stream is staged whole and the plan is `New`.
pub fn plan_streams<C, O, N>(
    codec: &C,
    old: &mut O,
    new: &mut N,
    streams: &Streams<'_>,
    artifacts: &ArtifactPaths,
    block_size: u64,
) -> Result<FilePlan>
where
    C: DeltaCodec + ?Sized,
    O: Read,
    N: Read,
{
    let mut cursor = BlockCursorPair::new(block_size, streams.old_len, streams.new_len);
    let mut plan = FilePlan {
        operation: Operation::Copy,
        artifacts: 0,
        staged_bytes: 0,
    };

    if cursor.is_single_block() {
        let old_bytes = util::read_block(old, streams.old_len as usize, streams.old_path)?;
        let new_bytes = util::read_block(new, streams.new_len as usize, streams.new_path)?;
        let selection = select_block(
            codec,
            &old_bytes,
            &new_bytes,
            &artifacts.delta(),
            artifacts.raw(),
        )?;
        plan.record(selection);
        plan.operation = match selection.op {
            BlockOp::CopyOld => Operation::Copy,
            BlockOp::CopyNew => Operation::New,
            BlockOp::Delta => Operation::Patch,
        };
        return Ok(plan);
    }

    if streams.new_len <= block_size || streams.old_len == 0 {
        warn!(
            path = %streams.new_path.display(),
            old_len = streams.old_len,
            new_len = streams.new_len,
            "no block pairing possible, staging whole new file"
        );
        let copied = copy_exact(new, streams.new_len, streams.new_path, artifacts.raw())?;
        plan.stage(copied);
        plan.operation = Operation::New;
        return Ok(plan);
    }

    let mut ops = Vec::with_capacity(cursor.paired_blocks() as usize + 1);

    while let Some(window) = cursor.next_window() {
        let old_block = util::read_block(old, window.old_len, streams.old_path)?;
        let new_block = util::read_block(new, window.new_len, streams.new_path)?;
        let selection = select_block(
            codec,
            &old_block,
            &new_block,
            &artifacts.part_delta(window.index),
            &artifacts.part_raw(window.index),
        )?;
        debug!(
            index = window.index,
            op = selection.op.tag(),
            staged = selection.staged_bytes,
            "block planned"
        );
        plan.record(selection);
        ops.push(selection.op);
    }

    if let Some((index, len)) = cursor.trailing() {
        let copied = copy_exact(new, len, streams.new_path, &artifacts.part_raw(index))?;
        cursor.commit_new(copied);
        plan.stage(copied);
        ops.push(BlockOp::CopyNew);
        debug!(index, bytes = copied, "trailing new bytes staged");
    }

    plan.operation = Operation::Parts(ops);
    Ok(plan)
}

/// Copy exactly `len` bytes of `src` into a fresh file at `dst`.
fn copy_exact<R: Read>(src: &mut R, len: u64, src_path: &Path, dst: &Path) -> Result<u64> {
    let mut writer = util::create_file(dst)?;
    let copied = std::io::copy(&mut (&mut *src).take(len), &mut writer).at(dst)?;
    if copied != len {
        return Err(PatchError::Io {
            path: src_path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("expected {len} bytes, stream ended after {copied}"),
            ),
        });
    }
    writer.flush().at(dst)?;
    Ok(copied)
}
