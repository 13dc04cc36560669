//! Error types for chunkpatch.
//!
//! Nothing here is recovered locally: every variant aborts the current diff or
//! patch run and surfaces to the caller.

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Main error type for diff and patch runs.
#[derive(Debug, Error)]
pub enum PatchError {
    /// Open/read/write failure on a tree file or a staged artifact.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Delta computation or application failed.
    #[error("codec error: {message}")]
    Codec { message: String },

    /// Manifest is malformed or structurally invalid.
    #[error("manifest error: {message}")]
    Manifest { message: String },

    /// Whole-file digest did not match the manifest.
    #[error("{stage} digest mismatch for {path}: expected {expected}, got {actual}")]
    Verification {
        path: String,
        stage: VerifyStage,
        expected: String,
        actual: String,
    },

    /// A new-tree file would be overwritten by another entry of the patch
    /// directory.
    #[error("{path} clashes with {owner} in the patch directory")]
    ArtifactCollision { path: String, owner: String },

    /// Operation plan could not be replayed as written.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl PatchError {
    pub fn codec(message: impl Into<String>) -> Self {
        PatchError::Codec {
            message: message.into(),
        }
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        PatchError::Manifest {
            message: message.into(),
        }
    }
}

/// Which side of the replay a digest check guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStage {
    /// Old tree checked before any file is written.
    Precondition,
    /// New tree checked after replay.
    Postcondition,
}

impl fmt::Display for VerifyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyStage::Precondition => f.write_str("old file"),
            VerifyStage::Postcondition => f.write_str("new file"),
        }
    }
}

/// Violations of the operation-string protocol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown operation `{tag}` for {path}")]
    UnknownOperation { path: String, tag: String },

    #[error("empty operation for {path}")]
    EmptyOperation { path: String },

    /// A block step needs old bytes but the old file has no window left.
    #[error("block {index} of {path} has no matching old block (old file is {old_len} bytes)")]
    BlockCountMismatch {
        path: String,
        index: usize,
        old_len: u64,
    },
}

pub type Result<T> = std::result::Result<T, PatchError>;

/// Attach the offending path to an `io::Error`.
pub trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| PatchError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
