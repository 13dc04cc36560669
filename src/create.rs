use std::collections::BTreeSet;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::codec::{ChunkDeltaCodec, DeltaCodec};
use crate::digest::{self, TreeDigests};
use crate::error::{PatchError, Result};
use crate::manifest::{Manifest, ManifestBuilder};
use crate::patch_format::{
    ArtifactPaths, CreateSummary, Operation, DELTA_SUFFIX, MANIFEST_FILE_NAME,
};
use crate::planner;
use crate::util;

/// Classification of one new-tree file against the old tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
    Unchanged,
    Added,
    Modified,
}

/// Compare digest maps. Files only present in the old tree are not listed:
/// deletions are not part of a patch set.
pub fn classify<'a>(
    old: &'a TreeDigests,
    new: &'a TreeDigests,
) -> impl Iterator<Item = (&'a str, FileChange)> + 'a {
    new.iter().map(move |(path, new_digest)| {
        let change = match old.get(path) {
            Some(old_digest) if old_digest == new_digest => FileChange::Unchanged,
            Some(_) => FileChange::Modified,
            None => FileChange::Added,
        };
        (path.as_str(), change)
    })
}

/// Create a patch directory by comparing `old_dir` and `new_dir`.
/// Both trees are digested concurrently; diffing then runs file by file on a
/// blocking thread.
pub async fn create_patch(
    old_dir: &Path,
    new_dir: &Path,
    patch_dir: &Path,
    block_size: u64,
) -> anyhow::Result<CreateSummary> {
    let old_dir_owned = old_dir.to_path_buf();
    let new_dir_owned = new_dir.to_path_buf();

    let (old_digests, new_digests) = tokio::try_join!(
        tokio::task::spawn_blocking(move || digest::digest_tree(&old_dir_owned)),
        tokio::task::spawn_blocking(move || digest::digest_tree(&new_dir_owned)),
    )?;
    let old_digests = old_digests
        .with_context(|| format!("Failed to scan old directory: {}", old_dir.display()))?;
    let new_digests = new_digests
        .with_context(|| format!("Failed to scan new directory: {}", new_dir.display()))?;

    let dirs = PatchDirs {
        old: old_dir.to_path_buf(),
        new: new_dir.to_path_buf(),
        patch: patch_dir.to_path_buf(),
    };
    let (_, summary) = tokio::task::spawn_blocking(move || {
        build_patch(
            &ChunkDeltaCodec::default(),
            &dirs,
            &old_digests,
            &new_digests,
            block_size,
        )
    })
    .await??;

    Ok(summary)
}

#[derive(Debug, Clone)]
pub struct PatchDirs {
    pub old: PathBuf,
    pub new: PathBuf,
    pub patch: PathBuf,
}

/// Stage artifacts for every added or modified file and write the manifest.
pub fn build_patch<C: DeltaCodec + ?Sized>(
    codec: &C,
    dirs: &PatchDirs,
    old_digests: &TreeDigests,
    new_digests: &TreeDigests,
    block_size: u64,
) -> Result<(Manifest, CreateSummary)> {
    if block_size == 0 {
        return Err(PatchError::manifest("block size must be positive"));
    }
    check_artifact_names(old_digests, new_digests)?;
    util::ensure_dir(&dirs.patch)?;

    let mut builder = ManifestBuilder::new(block_size);
    let mut summary = CreateSummary::default();

    for path in old_digests.keys().filter(|p| !new_digests.contains_key(*p)) {
        debug!(%path, "removed file is not part of the patch set");
    }

    for (path, change) in classify(old_digests, new_digests) {
        let new_digest = &new_digests[path];
        match change {
            FileChange::Unchanged => {
                debug!(%path, "unchanged");
                builder.add(path, Operation::Copy, Some(new_digest.as_str()), new_digest);
                summary.files_copied += 1;
            }
            FileChange::Added => {
                let artifacts = ArtifactPaths::new(&dirs.patch, path);
                let bytes = util::copy_file(&dirs.new.join(path), artifacts.raw())?;
                info!(%path, bytes, "+ added");
                builder.add(path, Operation::New, None, new_digest);
                summary.files_added += 1;
                summary.artifacts_staged += 1;
                summary.bytes_staged += bytes;
            }
            FileChange::Modified => {
                let old_digest = &old_digests[path];
                let artifacts = ArtifactPaths::new(&dirs.patch, path);
                let plan = planner::plan_file(
                    codec,
                    &dirs.old.join(path),
                    &dirs.new.join(path),
                    &artifacts,
                    block_size,
                )?;
                info!(
                    %path,
                    op = %plan.operation,
                    staged = plan.staged_bytes,
                    "* modified"
                );
                match plan.operation {
                    Operation::Copy => summary.files_copied += 1,
                    Operation::New => summary.files_replaced += 1,
                    Operation::Patch => summary.files_patched += 1,
                    Operation::Parts(_) => summary.files_chunked += 1,
                }
                summary.artifacts_staged += plan.artifacts;
                summary.bytes_staged += plan.staged_bytes;
                builder.add(path, plan.operation, Some(old_digest.as_str()), new_digest);
            }
        }
    }

    let manifest = builder.finish();
    manifest.save(&dirs.patch)?;
    info!(files = manifest.operations.len(), "manifest written");

    Ok((manifest, summary))
}

/// Every added or modified file is staged under its own name, and a modified
/// file may also stage `<path>.bsdiff` and `<path>.part.<n>[.bsdiff]`. Refuse
/// trees where one staged name lands on another, or on the manifest.
pub fn check_artifact_names(old: &TreeDigests, new: &TreeDigests) -> Result<()> {
    let staged: BTreeSet<&str> = classify(old, new)
        .filter(|(_, change)| *change != FileChange::Unchanged)
        .map(|(path, _)| path)
        .collect();

    for path in &staged {
        let under_manifest = path
            .strip_prefix(MANIFEST_FILE_NAME)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
        if under_manifest {
            return Err(PatchError::ArtifactCollision {
                path: path.to_string(),
                owner: format!("the manifest {MANIFEST_FILE_NAME}"),
            });
        }
    }

    let modified = classify(old, new).filter(|(_, change)| *change == FileChange::Modified);
    for (owner, _) in modified {
        let later = staged.range::<&str, _>((Bound::Excluded(owner), Bound::Unbounded));
        for path in later.take_while(|path| path.starts_with(owner)) {
            if is_artifact_suffix(&path[owner.len()..]) {
                return Err(PatchError::ArtifactCollision {
                    path: path.to_string(),
                    owner: format!("a staged block of {owner}"),
                });
            }
        }
    }
    Ok(())
}

fn is_artifact_suffix(suffix: &str) -> bool {
    if suffix == DELTA_SUFFIX {
        return true;
    }
    match suffix.strip_prefix(".part.") {
        Some(rest) => {
            let index = rest.strip_suffix(DELTA_SUFFIX).unwrap_or(rest);
            !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
