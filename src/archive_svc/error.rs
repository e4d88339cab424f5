use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("archive I/O failed: {0}")]
    IOError(#[from] std::io::Error),
    #[error("cannot archive {0}: it has no directory name")]
    NoRootName(PathBuf),
    #[error("refusing to unpack entry {0}: it is not below the archive root")]
    UnsafeEntry(PathBuf),
}
