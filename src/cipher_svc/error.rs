use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed: wrong passphrase or corrupted archive")]
    DecryptionFailed,
    #[error("not an encrypted archive: {0}")]
    MalformedArchive(&'static str),
}
