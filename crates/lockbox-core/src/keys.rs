use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::KeyError;

/// XChaCha20-Poly1305 key length.
pub const KEY_LEN: usize = 32;

/// Symmetric key protecting every blob under one storage root.
/// Wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Short display fingerprint (first 4 bytes of SHA-256 over the key).
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey({})", self.fingerprint())
    }
}

/// Owns the single key file of a storage root.
///
/// The first successful `get_or_create_key` pins the key for the lifetime of
/// the instance. Creation on disk is create-if-absent, so separate instances
/// or processes racing on a fresh root all end up with the same key.
pub struct KeyStore {
    path: PathBuf,
    cached: Mutex<Option<EncryptionKey>>,
}

impl KeyStore {
    /// Lazy store: nothing touches the disk until the key is first needed.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    /// Load or create the key immediately.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KeyError> {
        let store = Self::new(path);
        store.get_or_create_key()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_or_create_key(&self) -> Result<EncryptionKey, KeyError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let key = match read_key(&self.path)? {
            Some(key) => {
                tracing::debug!("Loaded encryption key from {:?}", self.path);
                key
            }
            None => self.create_key()?,
        };

        *cached = Some(key.clone());
        Ok(key)
    }

    fn create_key(&self) -> Result<EncryptionKey, KeyError> {
        let access = |source: std::io::Error| KeyError::Access {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(access)?;
        }

        let candidate = EncryptionKey::generate();
        if publish_key(&self.path, &candidate).map_err(access)? {
            tracing::info!("Generated new encryption key at {:?}", self.path);
            return Ok(candidate);
        }

        // Another creator published first; adopt its key.
        tracing::debug!("Key file appeared concurrently at {:?}", self.path);
        read_key(&self.path)?.ok_or_else(|| {
            access(std::io::Error::new(ErrorKind::NotFound, "key file vanished after creation"))
        })
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore").field("path", &self.path).finish()
    }
}

/// Read the key file. `Ok(None)` if it does not exist yet.
fn read_key(path: &Path) -> Result<Option<EncryptionKey>, KeyError> {
    let mut data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(KeyError::Access {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if data.len() != KEY_LEN {
        let found = data.len();
        data.zeroize();
        return Err(KeyError::Corrupt {
            path: path.to_path_buf(),
            expected: KEY_LEN,
            found,
        });
    }

    let mut bytes = [0u8; KEY_LEN];
    bytes.copy_from_slice(&data);
    data.zeroize();
    Ok(Some(EncryptionKey(bytes)))
}

/// Atomically publish `key` at `path` unless a key file already exists.
///
/// The key is fully written to a private temporary file first and then
/// hard-linked into place, so readers never see a partial key. Returns
/// `false` when another writer got there first.
fn publish_key(path: &Path, key: &EncryptionKey) -> std::io::Result<bool> {
    let mut suffix = [0u8; 6];
    OsRng.fill_bytes(&mut suffix);
    let tmp_path = path.with_extension(format!("tmp-{}", hex::encode(suffix)));

    let written = write_private(&tmp_path, key.as_bytes());
    let published = written.and_then(|()| match fs::hard_link(&tmp_path, path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    });

    let _ = fs::remove_file(&tmp_path);
    published
}

fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
