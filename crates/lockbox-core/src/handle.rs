use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use storage::BLOB_EXTENSION;

const HANDLE_BYTES: usize = 16;

/// Opaque random token naming one encrypted blob.
///
/// Never derived from content or filename, so identical uploads get
/// distinct handles and nothing about the file leaks into the blob name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageHandle(String);

impl StorageHandle {
    pub fn generate() -> Self {
        let mut bytes = [0u8; HANDLE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a handle previously returned by `generate`.
    ///
    /// Stored names of the form `{token}.enc` are accepted as well.
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let suffix = format!(".{}", BLOB_EXTENSION);
        match token.strip_suffix(&suffix) {
            Some(stem) => Self(stem.to_string()),
            None => Self(token),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the blob file on disk.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.0, BLOB_EXTENSION)
    }
}

impl fmt::Display for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StorageHandle {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}
