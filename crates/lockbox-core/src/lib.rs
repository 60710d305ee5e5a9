//! Lockbox Core - encrypted blob storage with ephemeral LAN sharing.
//!
//! Raw bytes go in through [`EncryptedBlobStore::store`] and come back as an
//! opaque [`StorageHandle`]; the caller owns the handle and decides what to
//! associate it with. Decrypted payloads can be handed to a one-off HTTP
//! listener through [`Lockbox::share`].

pub mod blob_store;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handle;
pub mod keys;
pub mod lockbox;

// Re-export commonly used types
pub use blob_store::EncryptedBlobStore;
pub use config::LockboxConfig;
pub use error::{KeyError, VaultError};
pub use handle::StorageHandle;
pub use keys::{EncryptionKey, KeyStore};
pub use lockbox::Lockbox;
pub use lockbox_share::{ShareConfig, ShareError, ShareServer, ShareSession};
