//! Whole-file digest checks around a replay.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::digest::digest_file;
use crate::error::{PatchError, Result, VerifyStage};
use crate::manifest::Manifest;

/// Refuse to patch a tree that drifted from the one the manifest was made
/// against. Runs before any new-tree byte is written.
pub fn verify_old_tree(manifest: &Manifest, old_dir: &Path) -> Result<usize> {
    verify_tree(&manifest.old_digests, old_dir, VerifyStage::Precondition)
}

/// Confirm every rebuilt file matches its recorded digest.
pub fn verify_new_tree(manifest: &Manifest, new_dir: &Path) -> Result<usize> {
    verify_tree(&manifest.new_digests, new_dir, VerifyStage::Postcondition)
}

fn verify_tree(
    digests: &BTreeMap<String, String>,
    root: &Path,
    stage: VerifyStage,
) -> Result<usize> {
    for (path, expected) in digests {
        let actual = digest_file(&root.join(path))?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(PatchError::Verification {
                path: path.clone(),
                stage,
                expected: expected.clone(),
                actual,
            });
        }
        debug!(%path, %stage, "digest verified");
    }
    Ok(digests.len())
}
