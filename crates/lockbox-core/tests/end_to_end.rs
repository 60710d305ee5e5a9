use lockbox_core::{Lockbox, LockboxConfig, StorageHandle, VaultError};
use std::net::{IpAddr, Ipv4Addr};
use tempfile::TempDir;

fn config(root: &std::path::Path) -> LockboxConfig {
    let mut cfg = LockboxConfig::with_root(root);
    cfg.share.advertise_ip = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
    cfg.share.idle_timeout_secs = None;
    cfg
}

async fn get(url: &str) -> reqwest::Response {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(url)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_key_survives_restart() -> anyhow::Result<()> {
    let temp = TempDir::new()?;

    let handle = {
        let lockbox = Lockbox::open(config(temp.path()))?;
        lockbox.store(b"written before restart").await?
    };

    let reopened = Lockbox::open(config(temp.path()))?;
    assert_eq!(reopened.load(&handle).await?, b"written before restart");
    Ok(())
}

#[tokio::test]
async fn test_handle_from_stored_name_loads() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let lockbox = Lockbox::open(config(temp.path()))?;

    let handle = lockbox.store(b"payload").await?;
    let persisted = handle.file_name();
    assert_eq!(lockbox.load(&StorageHandle::new(persisted)).await?, b"payload");
    Ok(())
}

#[tokio::test]
async fn test_flipping_any_byte_fails_authentication() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let lockbox = Lockbox::open(config(temp.path()))?;

    let handle = lockbox.store(b"do not touch").await?;
    let path = lockbox.storage().blob_path(handle.as_str()).unwrap();
    let original = std::fs::read(&path)?;

    for i in 0..original.len() {
        let mut tampered = original.clone();
        tampered[i] ^= 0x80;
        std::fs::write(&path, &tampered)?;

        match lockbox.load(&handle).await {
            Err(VaultError::BlobAuthentication(h)) => assert_eq!(h, handle),
            other => panic!("byte {}: expected authentication failure, got {:?}", i, other),
        }
    }

    std::fs::write(&path, &original)?;
    assert_eq!(lockbox.load(&handle).await?, b"do not touch");
    Ok(())
}

#[tokio::test]
async fn test_foreign_key_fails_authentication() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let handle = Lockbox::open(config(temp.path()))?.store(b"old key").await?;

    // Replacing the key file is a rotation the store cannot see through
    std::fs::remove_file(config(temp.path()).key_path())?;
    let rekeyed = Lockbox::open(config(temp.path()))?;

    let err = rekeyed.load(&handle).await.unwrap_err();
    assert!(matches!(err, VaultError::BlobAuthentication(_)));
    Ok(())
}

#[tokio::test]
async fn test_missing_handle_is_not_found() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let lockbox = Lockbox::open(config(temp.path()))?;

    let err = lockbox.load(&StorageHandle::new("nonexistent-handle")).await.unwrap_err();
    assert!(matches!(err, VaultError::BlobNotFound(_)));

    let err = lockbox.share(&StorageHandle::new("nonexistent-handle"), "x.txt").await.unwrap_err();
    assert!(matches!(err, VaultError::BlobNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn test_store_then_share_then_download() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let lockbox = Lockbox::open(config(temp.path()))?;

    let handle = lockbox.store(b"hello world").await?;
    let session = lockbox.share(&handle, "greeting.txt").await?;
    assert!(session.url().starts_with("http://127.0.0.1:"));
    assert!(session.url().ends_with("/download"));

    let resp = get(session.url()).await;
    assert_eq!(resp.status(), 200);
    let disposition = resp.headers()["content-disposition"].to_str()?.to_string();
    assert!(disposition.contains("greeting.txt"));
    assert_eq!(&resp.bytes().await?[..], b"hello world");

    let missing = get(&session.url().replace("/download", "/missing")).await;
    assert_eq!(missing.status(), 404);

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_share_with_overrides() -> anyhow::Result<()> {
    let temp = TempDir::new()?;
    let lockbox = Lockbox::open(config(temp.path()))?;

    let handle = lockbox.store(b"one shot").await?;
    let server = lockbox.share_server().clone().with_max_downloads(1).with_token(true);
    let mut session = lockbox.share_with(&server, &handle, "one.txt").await?;
    assert!(session.url().contains("/download?token="));

    let resp = get(session.url()).await;
    assert_eq!(&resp.bytes().await?[..], b"one shot");

    tokio::time::timeout(std::time::Duration::from_secs(5), session.wait()).await?;
    assert_eq!(session.downloads(), 1);
    Ok(())
}
