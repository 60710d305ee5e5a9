use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use lockbox_share::ShareConfig;

pub const DATA_DIR: &str = "data";
pub const STORAGE_DIR: &str = "storage";
pub const KEY_FILE: &str = "storage.key";
pub const CONFIG_FILE: &str = "config.json";
pub const RECORDS_FILE: &str = "records.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockboxConfig {
    /// Root holding `data/` (key, config, records) and `storage/` (blobs)
    pub root: PathBuf,

    /// Defaults for share sessions
    #[serde(default)]
    pub share: ShareConfig,
}

impl Default for LockboxConfig {
    fn default() -> Self {
        Self::with_root(
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".lockbox"),
        )
    }
}

impl LockboxConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            share: ShareConfig::default(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.root.join(STORAGE_DIR)
    }

    pub fn key_path(&self) -> PathBuf {
        self.data_dir().join(KEY_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir().join(CONFIG_FILE)
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir().join(RECORDS_FILE)
    }

    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(self.data_dir()).context("Failed to create data directory")?;
        std::fs::create_dir_all(self.storage_dir()).context("Failed to create storage directory")?;
        Ok(())
    }

    /// Load `data/config.json` under `root`, or defaults if there is none.
    ///
    /// The returned config is always rooted at `root`, wherever the file
    /// was originally written.
    pub fn load(root: &Path) -> anyhow::Result<Self> {
        let mut cfg = Self::with_root(root);
        let cfg_path = cfg.config_path();
        if !cfg_path.exists() {
            return Ok(cfg);
        }

        let cfg_json = std::fs::read_to_string(&cfg_path)
            .with_context(|| format!("Failed to read {}", cfg_path.display()))?;
        let stored: LockboxConfig = serde_json::from_str(&cfg_json)
            .with_context(|| format!("Invalid config {}", cfg_path.display()))?;

        cfg.share = stored.share;
        Ok(cfg)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.ensure_dirs()?;
        let cfg_json = serde_json::to_string_pretty(self)?;
        std::fs::write(self.config_path(), cfg_json).context("Failed to write config")?;
        Ok(())
    }
}
