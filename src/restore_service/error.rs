use std::path::PathBuf;

use thiserror::Error;

use crate::{archive_svc, cipher_svc, process_svc, prompt_svc::PromptError};

pub type Result<T> = std::result::Result<T, Error>;

///
/// Any of these ends the restore where it stands. Nothing is rolled back.
///
#[derive(Debug, Error)]
pub enum Error {
    #[error("snapshot {0} not found")]
    SnapshotNotFound(PathBuf),
    #[error("database did not accept connections after restart")]
    DatabaseNotReady,
    #[error("could not restore ownership of {path}: {source}")]
    OwnershipError { path: PathBuf, source: nix::Error },
    #[error(transparent)]
    ProcessError(#[from] process_svc::error::Error),
    #[error(transparent)]
    ArchiveError(#[from] archive_svc::error::Error),
    #[error(transparent)]
    CipherError(#[from] cipher_svc::error::Error),
    #[error(transparent)]
    PromptError(#[from] PromptError),
    #[error("I/O error during restore: {0}")]
    IOError(#[from] std::io::Error),
}
