//! Rebuilds files of the new tree from the old tree and staged artifacts.
//!
//! Per file: `copy` and `new` stream a whole file, `patch` applies one delta
//! against the whole old file, and block plans walk the old file in lock-step
//! with the tag sequence. Any failure stops the run; files written so far are
//! left as they are.

use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::codec::DeltaCodec;
use crate::cursor::BlockCursorPair;
use crate::error::{IoResultExt, ProtocolError, Result};
use crate::patch_format::{ArtifactPaths, BlockOp, Operation};
use crate::util;

pub struct PatchReplayer<'a, C: DeltaCodec + ?Sized> {
    codec: &'a C,
    old_dir: &'a Path,
    new_dir: &'a Path,
    patch_dir: &'a Path,
    block_size: u64,
}

impl<'a, C: DeltaCodec + ?Sized> PatchReplayer<'a, C> {
    pub fn new(
        codec: &'a C,
        old_dir: &'a Path,
        new_dir: &'a Path,
        patch_dir: &'a Path,
        block_size: u64,
    ) -> Self {
        Self {
            codec,
            old_dir,
            new_dir,
            patch_dir,
            block_size,
        }
    }

    /// Rebuild `path` in the new tree. Returns the bytes written.
    pub fn replay(&self, path: &str, operation: &Operation) -> Result<u64> {
        let old_path = self.old_dir.join(path);
        let new_path = self.new_dir.join(path);
        let artifacts = ArtifactPaths::new(self.patch_dir, path);

        let written = match operation {
            Operation::Copy => util::copy_file(&old_path, &new_path)?,
            Operation::New => util::copy_file(artifacts.raw(), &new_path)?,
            Operation::Patch => self.replay_whole(&old_path, &new_path, &artifacts.delta())?,
            Operation::Parts(ops) => {
                let old_len = std::fs::metadata(&old_path).at(&old_path)?.len();
                let mut old = util::open_file(&old_path)?;
                let mut out = util::create_file(&new_path)?;
                let files = ReplayFiles {
                    relative_path: path,
                    old_path: &old_path,
                    new_path: &new_path,
                    old_len,
                };
                let written = replay_parts(
                    self.codec,
                    &mut old,
                    &mut out,
                    ops,
                    &files,
                    &artifacts,
                    self.block_size,
                )?;
                out.flush().at(&new_path)?;
                written
            }
        };

        info!(%path, op = %operation, bytes = written, "file rebuilt");
        Ok(written)
    }

    fn replay_whole(&self, old_path: &Path, new_path: &Path, delta_path: &Path) -> Result<u64> {
        let old_len = std::fs::metadata(old_path).at(old_path)?.len();
        let delta = std::fs::read(delta_path).at(delta_path)?;

        // Scope the mmap so it is dropped before the new file is written.
        let new_data = if old_len == 0 {
            self.codec.apply_delta(&[], &delta)?
        } else {
            let old_map = util::mmap_file(old_path)?;
            self.codec.apply_delta(&old_map, &delta)?
        };

        util::write_file(new_path, &new_data)?;
        Ok(new_data.len() as u64)
    }
}

/// Paths and old length of one file being replayed block-wise.
#[derive(Debug, Clone, Copy)]
pub struct ReplayFiles<'a> {
    pub relative_path: &'a str,
    pub old_path: &'a Path,
    pub new_path: &'a Path,
    pub old_len: u64,
}

/// Replay a block plan from an open old stream into `out`, strictly in index
/// order. The old cursor advances one window per tag, including `new` tags.
pub fn replay_parts<C, O, W>(
    codec: &C,
    old: &mut O,
    out: &mut W,
    ops: &[BlockOp],
    files: &ReplayFiles<'_>,
    artifacts: &ArtifactPaths,
    block_size: u64,
) -> Result<u64>
where
    C: DeltaCodec + ?Sized,
    O: Read + Seek,
    W: Write,
{
    let mut cursor = BlockCursorPair::for_replay(block_size, files.old_len);

    for op in ops {
        let window = cursor.step_old();

        let written = match op {
            BlockOp::CopyOld => {
                require_old_block(files, window.index, window.old_len)?;
                let block = util::read_block(old, window.old_len, files.old_path)?;
                out.write_all(&block).at(files.new_path)?;
                block.len() as u64
            }
            BlockOp::CopyNew => {
                old.seek_relative(window.old_len as i64)
                    .at(files.old_path)?;
                let src: PathBuf = artifacts.part_raw(window.index);
                let mut staged = util::open_file(&src)?;
                std::io::copy(&mut staged, out).at(files.new_path)?
            }
            BlockOp::Delta => {
                require_old_block(files, window.index, window.old_len)?;
                let block = util::read_block(old, window.old_len, files.old_path)?;
                let delta_path = artifacts.part_delta(window.index);
                let delta = std::fs::read(&delta_path).at(&delta_path)?;
                let rebuilt = codec.apply_delta(&block, &delta)?;
                out.write_all(&rebuilt).at(files.new_path)?;
                rebuilt.len() as u64
            }
        };

        debug!(index = window.index, op = op.tag(), bytes = written, "block replayed");
        cursor.commit_new(written);
    }

    Ok(cursor.new_offset())
}

fn require_old_block(files: &ReplayFiles<'_>, index: usize, old_len: usize) -> Result<()> {
    if old_len == 0 {
        return Err(ProtocolError::BlockCountMismatch {
            path: files.relative_path.to_string(),
            index,
            old_len: files.old_len,
        }
        .into());
    }
    Ok(())
}
