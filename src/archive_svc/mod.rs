pub mod error;

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Component, Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tracing::warn;
use walkdir::WalkDir;

#[cfg(test)]
use mockall::automock;

use self::error::*;

///
/// What went into an archive
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub entries: usize,
    pub skipped: Vec<PathBuf>,
}

///
/// Gzipped tar archives of directory trees. Archives are rooted one level
/// above the source, so every entry starts with the source directory's name.
/// Extraction drops that root name, so an archive can be unpacked into a
/// directory of any name.
///
#[cfg_attr(test, automock)]
pub trait Archiver : Send + Sync {
    fn archive_to_file(&self, src: &Path, dest: &Path) -> Result<ArchiveReport>;
    fn archive_to_bytes(&self, src: &Path) -> Result<(Vec<u8>, ArchiveReport)>;
    ///
    /// Unpacks the contents of the archive's root directory into `dest`
    ///
    fn extract_file(&self, archive: &Path, dest: &Path) -> Result<()>;
    fn extract_bytes(&self, bytes: &[u8], dest: &Path) -> Result<()>;
}

pub struct TarGzArchiver;

impl TarGzArchiver {
    ///
    /// Appends every entry below `src` to a gzipped tar written into `writer`.
    /// Entries that cannot be read are logged and skipped.
    ///
    fn write_tree<W: Write>(src: &Path, writer: W) -> Result<(W, ArchiveReport)> {
        let root_name = src.file_name().ok_or_else(|| Error::NoRootName(src.to_path_buf()))?;
        let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::best()));
        builder.follow_symlinks(false);

        let mut report = ArchiveReport::default();
        for entry in WalkDir::new(src) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    report.skipped.push(e.path().map(Path::to_path_buf).unwrap_or_default());
                    continue;
                }
            };

            let rel = entry.path().strip_prefix(src).unwrap_or_else(|_| Path::new(""));
            let name = Path::new(root_name).join(rel);
            let appended = if entry.file_type().is_dir() {
                builder.append_dir(&name, entry.path())
            } else {
                builder.append_path_with_name(entry.path(), &name)
            };

            match appended {
                Ok(()) => report.entries += 1,
                Err(e) => {
                    warn!("Skipping {}: {}", entry.path().display(), e);
                    report.skipped.push(entry.path().to_path_buf());
                }
            }
        }

        let writer = builder.into_inner()?.finish()?;
        Ok((writer, report))
    }

    fn unpack<R: Read>(reader: R, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        let mut archive = tar::Archive::new(GzDecoder::new(reader));
        archive.set_preserve_permissions(true);
        archive.set_overwrite(true);

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.into_owned();
            let rel = below_root(&name).ok_or_else(|| Error::UnsafeEntry(name.clone()))?;
            // the root directory itself
            if rel.as_os_str().is_empty() {
                continue;
            }

            let target = dest.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            entry.unpack(&target)?;
        }
        Ok(())
    }
}

impl Archiver for TarGzArchiver {
    fn archive_to_file(&self, src: &Path, dest: &Path) -> Result<ArchiveReport> {
        let (mut writer, report) = Self::write_tree(src, BufWriter::new(File::create(dest)?))?;
        writer.flush()?;
        Ok(report)
    }
    fn archive_to_bytes(&self, src: &Path) -> Result<(Vec<u8>, ArchiveReport)> {
        Self::write_tree(src, Vec::new())
    }
    fn extract_file(&self, archive: &Path, dest: &Path) -> Result<()> {
        Self::unpack(BufReader::new(File::open(archive)?), dest)
    }
    fn extract_bytes(&self, bytes: &[u8], dest: &Path) -> Result<()> {
        Self::unpack(bytes, dest)
    }
}

///
/// The entry name without its leading root directory. `None` for names that
/// are absolute or climb out with `..`.
///
fn below_root(name: &Path) -> Option<&Path> {
    let mut components = name.components();
    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => return None,
    }
    let rel = components.as_path();
    rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)).then_some(rel)
}
