use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::codec::{ChunkDeltaCodec, DeltaCodec};
use crate::error::{IoResultExt, PatchError, Result};
use crate::manifest::Manifest;
use crate::patch_format::ApplySummary;
use crate::replay::PatchReplayer;
use crate::{util, verify};

/// Rebuild the new tree at `new_dir` from `old_dir` and the patch directory.
pub async fn apply_patch(
    old_dir: &Path,
    new_dir: &Path,
    patch_dir: &Path,
) -> anyhow::Result<ApplySummary> {
    let old_dir = old_dir.to_path_buf();
    let new_dir = new_dir.to_path_buf();
    let patch_dir = patch_dir.to_path_buf();

    let summary = tokio::task::spawn_blocking(move || {
        apply_patch_with(&ChunkDeltaCodec::default(), &old_dir, &new_dir, &patch_dir)
            .with_context(|| format!("Failed to apply patch from {}", patch_dir.display()))
    })
    .await??;

    Ok(summary)
}

/// Read the manifest, check the old tree, replay every file in path order,
/// then check the new tree. Stops at the first failure.
pub fn apply_patch_with<C: DeltaCodec + ?Sized>(
    codec: &C,
    old_dir: &Path,
    new_dir: &Path,
    patch_dir: &Path,
) -> Result<ApplySummary> {
    let manifest = Manifest::load(patch_dir)?;

    util::ensure_dir(new_dir)?;
    let old_root = old_dir.canonicalize().at(old_dir)?;
    let new_root = new_dir.canonicalize().at(new_dir)?;
    if old_root == new_root {
        return Err(PatchError::Io {
            path: new_root,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "output directory must differ from the old directory",
            ),
        });
    }

    let mut summary = ApplySummary {
        old_files_verified: verify::verify_old_tree(&manifest, &old_root)?,
        ..ApplySummary::default()
    };
    info!(files = summary.old_files_verified, "old tree verified");

    let replayer = PatchReplayer::new(codec, &old_root, &new_root, patch_dir, manifest.block_size);
    for (path, operation) in &manifest.operations {
        summary.bytes_written += replayer.replay(path, operation)?;
        summary.count(operation);
    }

    summary.new_files_verified = verify::verify_new_tree(&manifest, &new_root)?;
    info!(files = summary.new_files_verified, "new tree verified");

    Ok(summary)
}

/// Check the old tree against a patch directory without writing anything.
pub fn verify_patch(old_dir: &Path, patch_dir: &Path) -> Result<usize> {
    let manifest = Manifest::load(patch_dir)?;
    verify::verify_old_tree(&manifest, old_dir)
}
