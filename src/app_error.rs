use thiserror::Error;

use crate::{backup_service, config::ConfigError, lock::LockError, restore_service, snapshot};

///
/// Fatal errors of a command invocation. Each ends the process with status 1.
///
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("this command must be run as root")]
    InsufficientPrivilege,
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Backup(#[from] backup_service::error::Error),
    #[error(transparent)]
    Restore(#[from] restore_service::error::Error),
    #[error(transparent)]
    Snapshot(#[from] snapshot::error::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
