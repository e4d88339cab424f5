use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("snapshot I/O failed: {0}")]
    IOError(#[from] std::io::Error),
    #[error("tier record is corrupt: {0}")]
    TierRecordError(#[from] serde_json::Error),
    #[error("invalid snapshot pattern: {0}")]
    GlobPatternError(#[from] glob::PatternError),
    #[error("could not read snapshot entry: {0}")]
    GlobError(#[from] glob::GlobError),
}
