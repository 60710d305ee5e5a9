use std::path::PathBuf;
use thiserror::Error;

use crate::handle::StorageHandle;
use lockbox_share::ShareError;

/// Failures reading or creating the key file. Fatal to the store.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("cannot access key file {path}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {path} is corrupt: expected {expected} bytes, found {found}")]
    Corrupt {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The handle does not resolve to a blob on disk.
    #[error("blob {0} not found")]
    BlobNotFound(StorageHandle),

    /// The blob exists but failed authenticated decryption: it was corrupted,
    /// tampered with, or written under a different key.
    #[error("blob {0} failed authentication")]
    BlobAuthentication(StorageHandle),

    #[error("encryption failed")]
    Encryption,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error(transparent)]
    Share(#[from] ShareError),
}
