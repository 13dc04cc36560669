//! Content digests.
//!
//! Whole files are identified by lowercase hex MD5, the digest recorded in the
//! manifest. Blocks compared during diffing use BLAKE3 fingerprints.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::Path;

use md5::{Digest, Md5};
use rayon::prelude::*;

use crate::error::{IoResultExt, Result};
use crate::util;

/// Relative path (forward slashes) to hex digest.
pub type TreeDigests = BTreeMap<String, String>;

/// Hex MD5 of a byte slice.
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Stream-hash a file. Uses a 256 KB BufReader to cut syscall overhead.
pub fn digest_file(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path).at(path)?;
    let mut reader = BufReader::with_capacity(256 * 1024, file);
    let mut hasher = Md5::new();
    std::io::copy(&mut reader, &mut hasher).at(path)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Digest every regular file under `root`, in parallel.
pub fn digest_tree(root: &Path) -> Result<TreeDigests> {
    let files = util::walk_files(root)?;
    files
        .par_iter()
        .map(|entry| -> Result<(String, String)> {
            Ok((entry.relative_path.clone(), digest_file(&entry.full_path)?))
        })
        .collect()
}

/// Fingerprint used to decide whether two blocks are identical.
pub fn block_fingerprint(block: &[u8]) -> blake3::Hash {
    blake3::hash(block)
}
