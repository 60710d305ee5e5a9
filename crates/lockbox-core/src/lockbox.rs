//! Facade wiring the key store, the encrypted blob store and the share server.

use std::sync::Arc;
use storage::LocalStorage;

use crate::blob_store::EncryptedBlobStore;
use crate::config::LockboxConfig;
use crate::error::VaultError;
use crate::handle::StorageHandle;
use crate::keys::KeyStore;
use lockbox_share::{ShareServer, ShareSession};

pub struct Lockbox {
    config: LockboxConfig,
    blobs: EncryptedBlobStore<LocalStorage>,
    shares: ShareServer,
}

impl Lockbox {
    /// Open (or initialize) a lockbox rooted at `config.root`.
    ///
    /// The key is loaded or created here, before any store or load can run.
    pub fn open(config: LockboxConfig) -> Result<Self, VaultError> {
        config.ensure_dirs()?;

        let keys = Arc::new(KeyStore::open(config.key_path())?);
        let storage = LocalStorage::new(config.storage_dir())?;
        let shares = ShareServer::new(config.share.clone());

        tracing::debug!("Opened lockbox at {}", config.root.display());
        Ok(Self {
            blobs: EncryptedBlobStore::new(keys, storage),
            shares,
            config,
        })
    }

    pub fn config(&self) -> &LockboxConfig {
        &self.config
    }

    pub fn blobs(&self) -> &EncryptedBlobStore<LocalStorage> {
        &self.blobs
    }

    pub fn storage(&self) -> &LocalStorage {
        self.blobs.storage()
    }

    pub fn key_fingerprint(&self) -> Result<String, VaultError> {
        Ok(self.blobs.keys().get_or_create_key()?.fingerprint())
    }

    pub async fn store(&self, raw: &[u8]) -> Result<StorageHandle, VaultError> {
        self.blobs.store(raw).await
    }

    pub async fn load(&self, handle: &StorageHandle) -> Result<Vec<u8>, VaultError> {
        self.blobs.load(handle).await
    }

    /// Decrypt a blob and serve it once-off with the configured share limits.
    pub async fn share(&self, handle: &StorageHandle, filename: &str) -> Result<ShareSession, VaultError> {
        self.share_with(&self.shares, handle, filename).await
    }

    /// Like [`Lockbox::share`], but with per-share overrides.
    pub async fn share_with(
        &self,
        server: &ShareServer,
        handle: &StorageHandle,
        filename: &str,
    ) -> Result<ShareSession, VaultError> {
        let payload = self.blobs.load(handle).await?;
        let session = server.serve(payload, filename).await?;
        tracing::info!("Shared blob {} as {}", handle, filename);
        Ok(session)
    }

    pub fn share_server(&self) -> &ShareServer {
        &self.shares
    }
}
