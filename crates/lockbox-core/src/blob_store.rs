//! Encrypted blob store generic over a `Storage` backend.
//!
//! The store never records which handles it has issued; the caller keeps
//! the handle alongside whatever it describes and passes it back to `load`.

use std::sync::Arc;
use storage::Storage;

use crate::crypto;
use crate::error::VaultError;
use crate::handle::StorageHandle;
use crate::keys::KeyStore;

pub struct EncryptedBlobStore<S> {
    keys: Arc<KeyStore>,
    storage: Arc<S>,
}

impl<S> Clone for EncryptedBlobStore<S> {
    fn clone(&self) -> Self {
        Self {
            keys: self.keys.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<S> EncryptedBlobStore<S>
where
    S: Storage + 'static,
{
    pub fn new(keys: Arc<KeyStore>, storage: S) -> Self {
        Self {
            keys,
            storage: Arc::new(storage),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Encrypt `raw` and write it under a fresh random handle.
    ///
    /// The handle is only returned once the blob is durably written.
    pub async fn store(&self, raw: &[u8]) -> Result<StorageHandle, VaultError> {
        let key = self.keys.get_or_create_key()?;
        let handle = StorageHandle::generate();

        let sealed = crypto::seal(&key, handle.as_str().as_bytes(), raw).map_err(|e| {
            tracing::error!("Sealing {} bytes failed: {}", raw.len(), e);
            VaultError::Encryption
        })?;

        self.storage.put_blob(handle.as_str(), &sealed).await?;

        tracing::debug!("Stored blob {} ({} bytes plaintext, {} sealed)", handle, raw.len(), sealed.len());
        Ok(handle)
    }

    /// Read and decrypt the blob named by `handle`.
    pub async fn load(&self, handle: &StorageHandle) -> Result<Vec<u8>, VaultError> {
        let sealed = self
            .storage
            .get_blob(handle.as_str())
            .await?
            .ok_or_else(|| VaultError::BlobNotFound(handle.clone()))?;

        let key = self.keys.get_or_create_key()?;
        let plaintext = crypto::open(&key, handle.as_str().as_bytes(), &sealed).map_err(|e| {
            tracing::warn!("Blob {} failed authentication: {}", handle, e);
            VaultError::BlobAuthentication(handle.clone())
        })?;

        tracing::debug!("Loaded blob {} ({} bytes)", handle, plaintext.len());
        Ok(plaintext)
    }
}
