//! Sealed blob format.
//!
//! - XChaCha20-Poly1305 with a fresh random 24-byte nonce per blob.
//! - Layout: `version (1) || nonce (24) || ciphertext || tag (16)`.
//! - The storage handle is bound as associated data, so a blob only opens
//!   under the name it was written with.

use chacha20poly1305::aead::{Aead, Payload};
use chacha20poly1305::{Key, KeyInit, XChaCha20Poly1305, XNonce};
use rand_core::{OsRng, RngCore};
use thiserror::Error;

use crate::keys::EncryptionKey;

pub const FORMAT_VERSION: u8 = 1;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
pub const HEADER_LEN: usize = 1 + NONCE_LEN;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("sealed blob too short: {0} bytes")]
    Truncated(usize),
    #[error("unsupported blob format version {0}")]
    UnsupportedVersion(u8),
    #[error("authentication tag mismatch")]
    Authentication,
    #[error("aead encrypt failed")]
    Encryption,
}

fn cipher(key: &EncryptionKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypt `plaintext`, returning a self-describing sealed blob.
pub fn seal(key: &EncryptionKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from(nonce_bytes);

    let ciphertext = cipher(key)
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encryption)?;

    let mut sealed = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    sealed.push(FORMAT_VERSION);
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Verify and decrypt a sealed blob.
pub fn open(key: &EncryptionKey, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptoError::Truncated(sealed.len()));
    }
    if sealed[0] != FORMAT_VERSION {
        return Err(CryptoError::UnsupportedVersion(sealed[0]));
    }

    let nonce = XNonce::from_slice(&sealed[1..HEADER_LEN]);
    cipher(key)
        .decrypt(nonce, Payload { msg: &sealed[HEADER_LEN..], aad })
        .map_err(|_| CryptoError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = EncryptionKey::generate();
        let data = b"per-user file contents";

        let sealed = seal(&key, b"handle", data).unwrap();
        assert_eq!(sealed.len(), HEADER_LEN + data.len() + TAG_LEN);
        assert_eq!(sealed[0], FORMAT_VERSION);

        assert_eq!(open(&key, b"handle", &sealed).unwrap(), data);
    }

    #[test]
    fn test_nonce_is_fresh_per_seal() {
        let key = EncryptionKey::generate();
        let a = seal(&key, b"h", b"same").unwrap();
        let b = seal(&key, b"h", b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_every_flipped_byte_is_detected() {
        let key = EncryptionKey::generate();
        let sealed = seal(&key, b"h", b"tamper me").unwrap();

        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x01;
            assert!(open(&key, b"h", &tampered).is_err(), "flip at byte {} went unnoticed", i);
        }
    }

    #[test]
    fn test_wrong_key_or_aad_fails() {
        let key = EncryptionKey::generate();
        let sealed = seal(&key, b"handle-a", b"data").unwrap();

        let other = EncryptionKey::generate();
        assert_eq!(open(&other, b"handle-a", &sealed), Err(CryptoError::Authentication));
        assert_eq!(open(&key, b"handle-b", &sealed), Err(CryptoError::Authentication));
    }

    #[test]
    fn test_short_and_unknown_version_rejected() {
        let key = EncryptionKey::generate();
        assert_eq!(open(&key, b"", &[1u8; 10]), Err(CryptoError::Truncated(10)));

        let mut sealed = seal(&key, b"", b"").unwrap();
        sealed[0] = 7;
        assert_eq!(open(&key, b"", &sealed), Err(CryptoError::UnsupportedVersion(7)));
    }
}
