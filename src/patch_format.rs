use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ProtocolError;

pub const MANIFEST_VERSION: &str = "1.0";
pub const MANIFEST_FILE_NAME: &str = "patch.json";
pub const DEFAULT_BLOCK_SIZE: u64 = 100 * 1024 * 1024;

pub const DELTA_SUFFIX: &str = ".bsdiff";

const TAG_COPY: &str = "copy";
const TAG_NEW: &str = "new";
const TAG_PATCH: &str = "patch";

/// Per-block decision inside a chunked plan.
///
/// Block tags reuse the whole-file literals on the wire: `copy`, `new`, `patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp {
    CopyOld,
    CopyNew,
    Delta,
}

impl BlockOp {
    pub fn tag(self) -> &'static str {
        match self {
            BlockOp::CopyOld => TAG_COPY,
            BlockOp::CopyNew => TAG_NEW,
            BlockOp::Delta => TAG_PATCH,
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            TAG_COPY => Some(BlockOp::CopyOld),
            TAG_NEW => Some(BlockOp::CopyNew),
            TAG_PATCH => Some(BlockOp::Delta),
            _ => None,
        }
    }
}

/// How one file of the new tree is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Unchanged: copy the old file verbatim.
    Copy,
    /// Copy the staged raw file `<path>` verbatim.
    New,
    /// Apply `<path>.bsdiff` against the whole old file.
    Patch,
    /// One tag per `block_size` window, old and new read in lock-step.
    /// Always holds at least two tags, otherwise it would read back as a
    /// whole-file operation.
    Parts(Vec<BlockOp>),
}

impl Operation {
    /// Parse an operation string as written in the manifest's `patches` map.
    pub fn parse(path: &str, s: &str) -> Result<Self, ProtocolError> {
        if s.is_empty() {
            return Err(ProtocolError::EmptyOperation {
                path: path.to_string(),
            });
        }
        if !s.contains(',') {
            return match s {
                TAG_COPY => Ok(Operation::Copy),
                TAG_NEW => Ok(Operation::New),
                TAG_PATCH => Ok(Operation::Patch),
                other => Err(ProtocolError::UnknownOperation {
                    path: path.to_string(),
                    tag: other.to_string(),
                }),
            };
        }
        s.split(',')
            .map(|tag| {
                BlockOp::from_tag(tag).ok_or_else(|| ProtocolError::UnknownOperation {
                    path: path.to_string(),
                    tag: tag.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Operation::Parts)
    }

    /// Whether replay reads bytes of the old file.
    pub fn reads_old(&self) -> bool {
        !matches!(self, Operation::New)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Copy => f.write_str(TAG_COPY),
            Operation::New => f.write_str(TAG_NEW),
            Operation::Patch => f.write_str(TAG_PATCH),
            Operation::Parts(ops) => {
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(op.tag())?;
                }
                Ok(())
            }
        }
    }
}

/// Staged artifact locations for one file, derived from `<patch_dir>/<path>`.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    base: PathBuf,
}

impl ArtifactPaths {
    pub fn new(patch_dir: &Path, relative_path: &str) -> Self {
        Self {
            base: patch_dir.join(relative_path),
        }
    }

    /// Whole-file raw copy: `<path>`.
    pub fn raw(&self) -> &Path {
        &self.base
    }

    /// Single-block delta: `<path>.bsdiff`.
    pub fn delta(&self) -> PathBuf {
        self.with_suffix(DELTA_SUFFIX)
    }

    /// Raw new block `index` (1-based): `<path>.part.<index>`.
    pub fn part_raw(&self, index: usize) -> PathBuf {
        self.with_suffix(&format!(".part.{index}"))
    }

    /// Delta for block `index` (1-based): `<path>.part.<index>.bsdiff`.
    pub fn part_delta(&self, index: usize) -> PathBuf {
        self.with_suffix(&format!(".part.{index}{DELTA_SUFFIX}"))
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut s = OsString::from(self.base.as_os_str());
        s.push(suffix);
        PathBuf::from(s)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CreateSummary {
    pub files_copied: usize,
    pub files_added: usize,
    /// Modified files staged whole because no delta or block plan paid off.
    pub files_replaced: usize,
    pub files_patched: usize,
    pub files_chunked: usize,
    pub artifacts_staged: usize,
    pub bytes_staged: u64,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplySummary {
    pub files_copied: usize,
    /// Files copied whole from the patch directory (`new`).
    pub files_added: usize,
    pub files_patched: usize,
    pub files_chunked: usize,
    pub bytes_written: u64,
    pub old_files_verified: usize,
    pub new_files_verified: usize,
}

impl ApplySummary {
    pub(crate) fn count(&mut self, operation: &Operation) {
        match operation {
            Operation::Copy => self.files_copied += 1,
            Operation::New => self.files_added += 1,
            Operation::Patch => self.files_patched += 1,
            Operation::Parts(_) => self.files_chunked += 1,
        }
    }
}
