//! Delta codec used for `patch` blocks.
//!
//! The planner and replayer only see the [`DeltaCodec`] trait; the default
//! [`ChunkDeltaCodec`] encodes rolling-hash copy/insert chunks with bincode and
//! compresses them with zstd.

use serde::{Deserialize, Serialize};

use crate::binary_diff::{self, MATCH_WINDOW};
use crate::binary_patch;
use crate::error::{PatchError, Result};

const ZSTD_LEVEL: i32 = 3;

/// Computes a transform from one buffer to another and replays it.
pub trait DeltaCodec {
    fn compute_delta(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>>;

    /// Fails with [`PatchError::Codec`] if `delta` is not a transform of `old`.
    fn apply_delta(&self, old: &[u8], delta: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffChunk {
    Copy { offset: u64, length: u64 },
    Insert { data: Vec<u8> },
}

#[derive(Debug, Serialize, Deserialize)]
struct DeltaPayload {
    old_fingerprint: [u8; 32],
    new_len: u64,
    chunks: Vec<DiffChunk>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkDeltaCodec {
    window: usize,
}

impl ChunkDeltaCodec {
    pub fn new() -> Self {
        Self::with_window(MATCH_WINDOW)
    }

    /// Codec matching old/new windows of `window` bytes.
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }
}

impl Default for ChunkDeltaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaCodec for ChunkDeltaCodec {
    fn compute_delta(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
        let payload = DeltaPayload {
            old_fingerprint: *blake3::hash(old).as_bytes(),
            new_len: new.len() as u64,
            chunks: binary_diff::compute_diff(old, new, self.window),
        };
        let encoded = bincode::serialize(&payload)
            .map_err(|e| PatchError::codec(format!("failed to encode delta: {e}")))?;
        zstd::bulk::compress(&encoded, ZSTD_LEVEL)
            .map_err(|e| PatchError::codec(format!("failed to compress delta: {e}")))
    }

    fn apply_delta(&self, old: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
        let decoder = zstd::Decoder::new(delta)
            .map_err(|e| PatchError::codec(format!("failed to open delta stream: {e}")))?;
        let payload: DeltaPayload = bincode::deserialize_from(decoder)
            .map_err(|e| PatchError::codec(format!("failed to decode delta: {e}")))?;

        if blake3::hash(old).as_bytes() != &payload.old_fingerprint {
            return Err(PatchError::codec(
                "delta was computed against a different old block",
            ));
        }

        let new = binary_patch::apply_diff(old, &payload.chunks)?;
        if new.len() as u64 != payload.new_len {
            return Err(PatchError::codec(format!(
                "delta produced {} bytes, expected {}",
                new.len(),
                payload.new_len
            )));
        }
        Ok(new)
    }
}
