use std::path::PathBuf;

use thiserror::Error;

use crate::{archive_svc, cipher_svc, process_svc, prompt_svc::PromptError};

pub type Result<T> = std::result::Result<T, Error>;

///
/// Failures that prevent a backup run from starting
///
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not create snapshot directory {path}: {source}")]
    SnapshotDirError { path: PathBuf, source: std::io::Error },
}

///
/// Outcome of a single failed or skipped backup step. Never aborts the run.
///
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    Skipped(String),
    #[error("database is not accepting connections")]
    DatabaseNotReady,
    #[error(transparent)]
    ProcessError(#[from] process_svc::error::Error),
    #[error(transparent)]
    ArchiveError(#[from] archive_svc::error::Error),
    #[error(transparent)]
    CipherError(#[from] cipher_svc::error::Error),
    #[error(transparent)]
    PromptError(#[from] PromptError),
    #[error("I/O error: {0}")]
    IOError(#[from] std::io::Error),
}
