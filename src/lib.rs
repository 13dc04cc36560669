//! Chunked binary patch sets between two versions of a directory tree.
//!
//! The diff side splits each changed file into fixed-size blocks, picks the
//! cheapest encoding per block (unchanged, raw replacement or delta), stages
//! the artifacts and records the decisions in a JSON manifest. The patch side
//! verifies the old tree, replays the manifest block by block and verifies the
//! rebuilt tree.

pub mod apply;
pub mod binary_diff;
pub mod binary_patch;
pub mod codec;
pub mod create;
pub mod cursor;
pub mod digest;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod patch_format;
pub mod planner;
pub mod replay;
pub mod rolling_hash;
pub mod selector;
pub mod util;
pub mod verify;

pub use apply::{apply_patch, apply_patch_with, verify_patch};
pub use codec::{ChunkDeltaCodec, DeltaCodec};
pub use create::{build_patch, create_patch, PatchDirs};
pub use error::{PatchError, ProtocolError, Result};
pub use manifest::{Manifest, ManifestBuilder};
pub use patch_format::{ApplySummary, BlockOp, CreateSummary, Operation};
