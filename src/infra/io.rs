use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Read a UTF-8 file, treating a missing file as empty.
pub fn read_to_string_or_empty<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("Failed to read {}", path.display()))),
    }
}

/// Where a whole-file write should land: symlinks resolve to their target
/// so externally managed links stay intact.
pub fn resolve_write_target(path: &Path) -> PathBuf {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// Replace a file's contents in full via temp file + rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let target = resolve_write_target(path);
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("create parent dir: {}", dir.display()))?;

    let mut tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("write temp file for {}", target.display()))?;
    tmp.as_file().sync_all().ok();

    // Keep the original permission bits (rc files are often 0644/0600)
    if let Ok(meta) = fs::metadata(&target) {
        fs::set_permissions(tmp.path(), meta.permissions()).ok();
    }

    tmp.persist(&target)
        .with_context(|| format!("replace {}", target.display()))?;
    Ok(())
}

/// Does anything (file, dir, or even a dangling symlink) occupy `path`?
pub fn path_occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}
