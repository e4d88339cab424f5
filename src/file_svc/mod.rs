use glob::{glob, Pattern};
use std::{io, path::{Path, PathBuf}};
use tracing::warn;
use walkdir::WalkDir;

use crate::snapshot::error::Result;

///
/// Returns every directory directly under `backups_dir` whose name starts
/// with an eight-digit date prefix. Entries that cannot be read are logged
/// and left out.
///
pub fn get_snapshot_dirs(backups_dir: &Path) -> Result<Vec<PathBuf>> {
    let ptn = format!(
        "{}/[0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]*",
        Pattern::escape(&backups_dir.to_string_lossy())
    );

    let mut dirs = Vec::new();
    for entry in glob(&ptn)? {
        match entry {
            Ok(path) if path.is_dir() => dirs.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable backup entry: {}", e),
        }
    }

    Ok(dirs)
}

///
/// Total size in bytes of all regular files below `path`
///
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

///
/// Recursively copies `src` into `dest`, creating `dest` if needed
///
pub fn copy_dir_all(src: &Path, dest: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
