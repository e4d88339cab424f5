pub mod error;

use aes_gcm::{aead::{Aead, KeyInit}, Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;

#[cfg(test)]
use mockall::automock;

use self::error::*;

const MAGIC: &[u8; 5] = b"PIBK1";
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12; // 96 bits for AES-GCM
const KEY_SIZE: usize = 32;
const HEADER_SIZE: usize = MAGIC.len() + SALT_SIZE + NONCE_SIZE;

///
/// Password-based symmetric encryption of whole archives
///
#[cfg_attr(test, automock)]
pub trait Cipher : Send + Sync {
    fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>>;
    fn decrypt(&self, sealed: &[u8], passphrase: &str) -> Result<Vec<u8>>;
}

///
/// AES-256-GCM with an Argon2id key derived from the passphrase and a fresh
/// random salt per encryption. Layout: magic, salt, nonce, ciphertext + tag.
///
pub struct AesGcmCipher;

impl AesGcmCipher {
    fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_SIZE]> {
        let mut key = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| Error::KeyDerivationFailed(e.to_string()))?;
        Ok(key)
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8], passphrase: &str) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_SIZE];
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let key = Self::derive_key(passphrase, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| Error::EncryptionFailed)?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| Error::EncryptionFailed)?;

        let mut sealed = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
        sealed.extend_from_slice(MAGIC);
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn decrypt(&self, sealed: &[u8], passphrase: &str) -> Result<Vec<u8>> {
        if sealed.len() < HEADER_SIZE {
            return Err(Error::MalformedArchive("too short"));
        }
        let (magic, rest) = sealed.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(Error::MalformedArchive("bad magic"));
        }
        let (salt, rest) = rest.split_at(SALT_SIZE);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

        let key = Self::derive_key(passphrase, salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| Error::DecryptionFailed)?;
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| Error::DecryptionFailed)
    }
}
