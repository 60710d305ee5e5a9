use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use lockbox_core::{Lockbox, LockboxConfig};

mod records;

use records::{FileRecord, RecordIndex};

#[derive(Parser, Debug)]
#[command(name = "lockbox", version, about = "Encrypted file storage with LAN sharing")]
struct Cli {
    /// Set log level: error,warn,info,debug,trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Root directory holding data/ and storage/
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the storage root, encryption key and config
    Init,

    /// Show storage information
    Info,

    /// Encrypt a file into storage
    Put {
        /// Owner of the stored file
        #[arg(long)]
        owner: String,

        /// File to store
        #[arg(long)]
        file: PathBuf,
    },

    /// List an owner's files
    List {
        #[arg(long)]
        owner: String,
    },

    /// Decrypt a stored file
    Get {
        #[arg(long)]
        owner: String,

        /// Record id (see `list`)
        #[arg(long)]
        id: u64,

        /// Output path (defaults to the original filename)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete a stored file and its record
    Delete {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        id: u64,
    },

    /// Serve a stored file over HTTP on the local network
    Share {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        id: u64,

        /// Stop after this many downloads
        #[arg(long)]
        max_downloads: Option<u32>,

        /// Stop after this many seconds without requests
        #[arg(long)]
        idle_timeout: Option<u64>,

        /// Require a random token in the download URL
        #[arg(long)]
        token: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .init();

    // Determine storage root
    let root = cli.root.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lockbox")
    });

    match cli.cmd {
        Commands::Init => {
            let cfg = LockboxConfig::load(&root)?;
            cfg.save()?;
            let lockbox = Lockbox::open(cfg)?;

            println!("✓ Lockbox initialized");
            println!("  Root: {}", root.display());
            println!("  Key fingerprint: {}", lockbox.key_fingerprint()?);
        }

        Commands::Info => {
            let lockbox = open_lockbox(&root)?;
            let index = RecordIndex::load(&lockbox.config().records_path())?;
            let blobs = lockbox.storage().list_blobs().await?;
            let share = &lockbox.config().share;

            println!("Lockbox Information:");
            println!("  Root: {}", root.display());
            println!("  Key fingerprint: {}", lockbox.key_fingerprint()?);
            println!("  Records: {}", index.len());
            println!("  Blobs on disk: {}", blobs.len());
            println!("  Share bind: {}:{}", share.bind_addr, share.port);
            if let Some(secs) = share.idle_timeout_secs {
                println!("  Share idle timeout: {}s", secs);
            }
        }

        Commands::Put { owner, file } => {
            let lockbox = open_lockbox(&root)?;
            let records_path = lockbox.config().records_path();

            let filename = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", file.display()))?
                .to_string();
            let raw = tokio::fs::read(&file).await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let handle = lockbox.store(&raw).await?;

            let mut index = RecordIndex::load(&records_path)?;
            let record = index.add(&owner, &filename, handle).clone();
            index.save(&records_path)?;

            println!("✓ Stored {} ({} bytes)", filename, raw.len());
            println!("  Id: {}", record.id);
            println!("  Handle: {}", record.storage_handle);
        }

        Commands::List { owner } => {
            let cfg = LockboxConfig::load(&root)?;
            let index = RecordIndex::load(&cfg.records_path())?;

            let records: Vec<_> = index.for_owner(&owner).collect();
            println!("{} file(s) for {}:", records.len(), owner);
            for record in records {
                println!("  [{}] {}  ({})", record.id, record.filename, record.storage_handle.file_name());
            }
        }

        Commands::Get { owner, id, output } => {
            let lockbox = open_lockbox(&root)?;
            let index = RecordIndex::load(&lockbox.config().records_path())?;
            let record = index
                .find(id, &owner)
                .ok_or_else(|| anyhow::anyhow!("File not found"))?;

            let raw = lockbox.load(&record.storage_handle).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(&record.filename));
            tokio::fs::write(&output, &raw).await
                .with_context(|| format!("Failed to write {}", output.display()))?;

            println!("✓ Wrote {} ({} bytes)", output.display(), raw.len());
        }

        Commands::Delete { owner, id } => {
            let lockbox = open_lockbox(&root)?;
            let record = delete_file(&lockbox, &owner, id).await?;

            println!("✓ Deleted {}", record.filename);
        }

        Commands::Share { owner, id, max_downloads, idle_timeout, token } => {
            let lockbox = open_lockbox(&root)?;
            let index = RecordIndex::load(&lockbox.config().records_path())?;
            let record = index
                .find(id, &owner)
                .ok_or_else(|| anyhow::anyhow!("File not found"))?;

            let mut server = lockbox.share_server().clone();
            if let Some(max) = max_downloads {
                server = server.with_max_downloads(max);
            }
            if let Some(secs) = idle_timeout {
                server = server.with_idle_timeout(Duration::from_secs(secs));
            }
            if token {
                server = server.with_token(true);
            }

            let mut session = lockbox
                .share_with(&server, &record.storage_handle, &record.filename)
                .await?;

            println!("✓ Sharing '{}'", record.filename);
            println!("  URL: {}", session.url());
            println!("  Press Ctrl+C to stop");

            tokio::select! {
                _ = session.wait() => {
                    println!("✓ Share ended ({} download(s))", session.downloads());
                }
                _ = tokio::signal::ctrl_c() => {
                    let downloads = session.downloads();
                    session.stop().await;
                    println!("\n✓ Share stopped ({} download(s))", downloads);
                }
            }
        }
    }

    Ok(())
}

/// Forget the record first, then remove its blob.
///
/// If the index cannot be saved the blob stays in place, so a surviving
/// record never points at a deleted blob.
async fn delete_file(lockbox: &Lockbox, owner: &str, id: u64) -> Result<FileRecord> {
    let records_path = lockbox.config().records_path();
    let mut index = RecordIndex::load(&records_path)?;

    let record = index
        .remove(id, owner)
        .ok_or_else(|| anyhow::anyhow!("File not found"))?;
    index.save(&records_path)?;

    if !lockbox.storage().remove_blob(record.storage_handle.as_str()).await? {
        tracing::warn!("Blob {} was already missing", record.storage_handle);
    }

    Ok(record)
}

fn open_lockbox(root: &Path) -> Result<Lockbox> {
    let cfg = LockboxConfig::load(root)?;
    if !cfg.key_path().exists() {
        anyhow::bail!("Lockbox not initialized. Run 'lockbox init' first.");
    }

    Ok(Lockbox::open(cfg)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn lockbox_with_file(root: &Path) -> Result<(Lockbox, u64)> {
        let lockbox = Lockbox::open(LockboxConfig::with_root(root))?;
        let handle = lockbox.store(b"quarterly report").await?;

        let mut index = RecordIndex::default();
        let id = index.add("alice", "report.txt", handle).id;
        index.save(&lockbox.config().records_path())?;
        Ok((lockbox, id))
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_blob() -> Result<()> {
        let temp = TempDir::new()?;
        let (lockbox, id) = lockbox_with_file(temp.path()).await?;

        let record = delete_file(&lockbox, "alice", id).await?;
        assert_eq!(record.filename, "report.txt");
        assert!(lockbox.storage().blob_path(record.storage_handle.as_str()).is_some_and(|p| !p.exists()));

        let index = RecordIndex::load(&lockbox.config().records_path())?;
        assert_eq!(index.find(id, "alice"), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_keeps_blob_when_index_save_fails() -> Result<()> {
        let temp = TempDir::new()?;
        let (lockbox, id) = lockbox_with_file(temp.path()).await?;

        // A directory where the temporary index file goes makes the save fail
        let records_path = lockbox.config().records_path();
        std::fs::create_dir(records_path.with_extension("json.tmp"))?;

        assert!(delete_file(&lockbox, "alice", id).await.is_err());

        let index = RecordIndex::load(&records_path)?;
        let record = index.find(id, "alice").expect("record must survive a failed save");
        assert_eq!(lockbox.load(&record.storage_handle).await?, b"quarterly report");
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_is_scoped_to_owner() -> Result<()> {
        let temp = TempDir::new()?;
        let (lockbox, id) = lockbox_with_file(temp.path()).await?;

        assert!(delete_file(&lockbox, "mallory", id).await.is_err());
        let index = RecordIndex::load(&lockbox.config().records_path())?;
        assert!(index.find(id, "alice").is_some());
        Ok(())
    }
}
