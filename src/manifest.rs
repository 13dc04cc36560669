//! The manifest: `patch.json` at the root of a patch directory.
//!
//! ```json
//! {
//!   "manifest_version": "1.0",
//!   "bulk_size": 104857600,
//!   "old_md5": { "dir/a.bin": "<32 hex>" },
//!   "new_md5": { "dir/a.bin": "<32 hex>" },
//!   "patches": { "dir/a.bin": "copy,patch,new" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, PatchError, Result};
use crate::patch_format::{Operation, MANIFEST_FILE_NAME, MANIFEST_VERSION};
use crate::util;

#[derive(Debug, Serialize, Deserialize)]
struct ManifestWire {
    manifest_version: String,
    bulk_size: u64,
    old_md5: BTreeMap<String, String>,
    new_md5: BTreeMap<String, String>,
    patches: BTreeMap<String, String>,
}

/// Parsed, validated manifest. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: String,
    pub block_size: u64,
    /// Digests of old-tree files whose rebuild reads old bytes.
    pub old_digests: BTreeMap<String, String>,
    /// Digests every rebuilt file must match.
    pub new_digests: BTreeMap<String, String>,
    pub operations: BTreeMap<String, Operation>,
}

impl Manifest {
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let wire = ManifestWire {
            manifest_version: self.version.clone(),
            bulk_size: self.block_size,
            old_md5: self.old_digests.clone(),
            new_md5: self.new_digests.clone(),
            patches: self
                .operations
                .iter()
                .map(|(path, op)| (path.clone(), op.to_string()))
                .collect(),
        };
        serde_json::to_vec_pretty(&wire)
            .map_err(|e| PatchError::manifest(format!("failed to encode manifest: {e}")))
    }

    /// Decode and structurally validate a manifest.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let wire: ManifestWire = serde_json::from_slice(data)
            .map_err(|e| PatchError::manifest(format!("failed to decode manifest: {e}")))?;

        if wire.manifest_version != MANIFEST_VERSION {
            return Err(PatchError::manifest(format!(
                "unsupported manifest version {:?} (expected {:?})",
                wire.manifest_version, MANIFEST_VERSION
            )));
        }
        if wire.bulk_size == 0 {
            return Err(PatchError::manifest("bulk_size must be positive"));
        }

        for (path, digest) in wire.old_md5.iter().chain(wire.new_md5.iter()) {
            check_relative_path(path)?;
            check_digest(path, digest)?;
        }

        let mut operations = BTreeMap::new();
        for (path, op) in &wire.patches {
            check_relative_path(path)?;
            let op = Operation::parse(path, op)?;

            // Legacy manifests leave unchanged files out of new_md5.
            if op != Operation::Copy && !wire.new_md5.contains_key(path) {
                return Err(PatchError::manifest(format!("{path} has no new_md5 entry")));
            }
            if op.reads_old() && !wire.old_md5.contains_key(path) {
                return Err(PatchError::manifest(format!(
                    "{path} reads the old file but has no old_md5 entry"
                )));
            }
            operations.insert(path.clone(), op);
        }

        Ok(Manifest {
            version: wire.manifest_version,
            block_size: wire.bulk_size,
            old_digests: wire.old_md5,
            new_digests: wire.new_md5,
            operations,
        })
    }

    pub fn load(patch_dir: &Path) -> Result<Self> {
        let path = patch_dir.join(MANIFEST_FILE_NAME);
        let data = std::fs::read(&path).at(&path)?;
        Self::from_json(&data)
    }

    pub fn save(&self, patch_dir: &Path) -> Result<()> {
        util::write_file(&patch_dir.join(MANIFEST_FILE_NAME), &self.to_json()?)
    }
}

fn check_relative_path(path: &str) -> Result<()> {
    let p = Path::new(path);
    let ok = !path.is_empty()
        && p.components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(PatchError::manifest(format!(
            "{path:?} is not a path relative to the tree root"
        )))
    }
}

fn check_digest(path: &str, digest: &str) -> Result<()> {
    if digest.len() == 32 && digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(PatchError::manifest(format!(
            "{path} has malformed digest {digest:?}"
        )))
    }
}

/// Accumulates one entry per classified file during a diff run.
#[derive(Debug)]
pub struct ManifestBuilder {
    manifest: Manifest,
}

impl ManifestBuilder {
    pub fn new(block_size: u64) -> Self {
        Self {
            manifest: Manifest {
                version: MANIFEST_VERSION.to_string(),
                block_size,
                old_digests: BTreeMap::new(),
                new_digests: BTreeMap::new(),
                operations: BTreeMap::new(),
            },
        }
    }

    /// Record how `path` is rebuilt. The old digest is kept only when the
    /// operation reads old bytes.
    pub fn add(
        &mut self,
        path: &str,
        operation: Operation,
        old_digest: Option<&str>,
        new_digest: &str,
    ) -> &mut Self {
        if operation.reads_old() {
            if let Some(digest) = old_digest {
                self.manifest
                    .old_digests
                    .insert(path.to_string(), digest.to_string());
            }
        }
        self.manifest
            .new_digests
            .insert(path.to_string(), new_digest.to_string());
        self.manifest
            .operations
            .insert(path.to_string(), operation);
        self
    }

    pub fn finish(self) -> Manifest {
        self.manifest
    }
}
