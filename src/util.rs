use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use walkdir::WalkDir;

use crate::error::{IoResultExt, PatchError, Result};

const COPY_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub relative_path: String,
    pub full_path: PathBuf,
}

/// Walk a directory tree and collect its regular files with relative paths.
/// Paths use forward slashes for cross-platform consistency in the manifest.
pub fn walk_files(root: &Path) -> Result<Vec<FileEntry>> {
    let root = root.canonicalize().at(root)?;

    let mut entries = Vec::new();

    for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&root).to_path_buf();
            PatchError::Io {
                path,
                source: e.into(),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let full_path = entry.path().to_path_buf();
        let relative = full_path
            .strip_prefix(&root)
            .map_err(|_| invalid_path(&full_path, "path escapes the walked root"))?;
        let relative_path = relative
            .to_str()
            .ok_or_else(|| invalid_path(&full_path, "non-UTF8 path"))?
            .replace('\\', "/");

        entries.push(FileEntry {
            relative_path,
            full_path,
        });
    }

    Ok(entries)
}

fn invalid_path(path: &Path, reason: &str) -> PatchError {
    PatchError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, reason.to_string()),
    }
}

/// Memory-map a file for read-only access.
///
/// # Safety
/// The mapping is read-only. Callers must not concurrently truncate or replace
/// the underlying file while the `Mmap` is live.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).at(path)?;
    // SAFETY: old-tree files and staged artifacts are never written during a run.
    unsafe { Mmap::map(&file).at(path) }
}

/// Create `dir` (and its parents) unless it already exists as a directory.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PatchError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "path exists but is not a directory",
            ),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(dir).at(dir)
        }
        Err(e) => Err(e).at(dir),
    }
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Open `path` for writing, truncating any previous content.
pub fn create_file(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dir(path)?;
    let file = File::create(path).at(path)?;
    Ok(BufWriter::with_capacity(COPY_BUFFER_SIZE, file))
}

pub fn open_file(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).at(path)?;
    Ok(BufReader::with_capacity(COPY_BUFFER_SIZE, file))
}

pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    ensure_parent_dir(path)?;
    std::fs::write(path, data).at(path)
}

/// Stream-copy `src` to `dst`, returning the byte count.
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    let mut reader = open_file(src)?;
    let mut writer = create_file(dst)?;
    let copied = std::io::copy(&mut reader, &mut writer).at(dst)?;
    writer.flush().at(dst)?;
    Ok(copied)
}

/// Read exactly `len` bytes. A stream ending early is an I/O error, not a
/// short block: lengths are known up front.
pub fn read_block<R: Read>(reader: &mut R, len: usize, path: &Path) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).at(path)?;
    Ok(buf)
}
