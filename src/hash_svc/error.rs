use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read file for checksum: {0}")]
    FileReadError(#[from] tokio::io::Error),
}
