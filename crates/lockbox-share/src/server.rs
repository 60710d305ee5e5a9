//! Per-share HTTP listener.
//!
//! A session owns one listener and one payload. Handlers only ever see the
//! payload through the router state, so once the server task returns the
//! payload is released together with the router.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use rand_core::{OsRng, RngCore};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{config::ShareConfig, net};

pub const DOWNLOAD_PATH: &str = "/download";
const NOT_FOUND_BODY: &str = "File not found";
const TOKEN_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum ShareError {
    #[error("failed to bind share listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("share transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Spawns one listener per shared payload.
#[derive(Debug, Clone)]
pub struct ShareServer {
    config: ShareConfig,
    idle_timeout: Option<Duration>,
}

impl ShareServer {
    pub fn new(config: ShareConfig) -> Self {
        let idle_timeout = config.idle_timeout_secs.map(Duration::from_secs);
        Self { config, idle_timeout }
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_max_downloads(mut self, max: u32) -> Self {
        self.config.max_downloads = Some(max);
        self
    }

    pub fn with_token(mut self, require_token: bool) -> Self {
        self.config.require_token = require_token;
        self
    }

    pub fn config(&self) -> &ShareConfig {
        &self.config
    }

    /// Bind a fresh listener and serve `payload` as `filename` in the background.
    ///
    /// Returns as soon as the listener is bound. Must be called from within a
    /// tokio runtime.
    pub async fn serve(&self, payload: Vec<u8>, filename: &str) -> Result<ShareSession, ShareError> {
        let bind_addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| ShareError::Bind { addr: bind_addr, source })?;
        let local_addr = listener.local_addr()?;

        let host = self.config.advertise_ip.unwrap_or_else(|| {
            if self.config.bind_addr.is_unspecified() {
                net::advertised_ip()
            } else {
                self.config.bind_addr
            }
        });

        let token = self.config.require_token.then(generate_token);
        let mut url = format!("http://{}{}", SocketAddr::new(host, local_addr.port()), DOWNLOAD_PATH);
        if let Some(token) = &token {
            url.push_str("?token=");
            url.push_str(token);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let stop_tx = Arc::new(stop_tx);
        let activity = Arc::new(Activity::new());
        let payload_len = payload.len();

        let state = Arc::new(ShareState {
            payload: Bytes::from(payload),
            disposition: content_disposition(filename),
            token,
            max_downloads: self.config.max_downloads,
            activity: activity.clone(),
            stop_tx: stop_tx.clone(),
        });

        let router = Router::new()
            .route(DOWNLOAD_PATH, get(download))
            .fallback(not_found)
            .with_state(state);

        let server = axum::serve(listener, router).with_graceful_shutdown(stopped(stop_rx.clone()));

        if let Some(idle) = self.idle_timeout {
            tokio::spawn(idle_watchdog(idle, activity.clone(), stop_tx.clone(), stop_rx));
        }

        let task_stop = stop_tx.clone();
        let shared_name = filename.to_string();
        let task = tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::warn!("{}", ShareError::Transport(e));
            }
            task_stop.send_replace(true);
            tracing::info!("Stopped sharing {} on {}", shared_name, local_addr);
        });

        tracing::info!("Sharing {} ({} bytes) at {}", filename, payload_len, url);

        Ok(ShareSession {
            url,
            local_addr,
            activity,
            stop_tx,
            task: Some(task),
        })
    }
}

/// Handle to a running share. Dropping it stops the listener.
pub struct ShareSession {
    url: String,
    local_addr: SocketAddr,
    activity: Arc<Activity>,
    stop_tx: Arc<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl ShareSession {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of completed `GET /download` responses.
    pub fn downloads(&self) -> u32 {
        self.activity.downloads.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Wait until the session ends on its own (download limit or idle timeout).
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let _ = task.await;
        }
        self.task = None;
    }

    /// Close the listener and wait for in-flight responses to finish.
    pub async fn stop(mut self) {
        self.stop_tx.send_replace(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ShareSession {
    fn drop(&mut self) {
        self.stop_tx.send_replace(true);
    }
}

impl fmt::Debug for ShareSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareSession")
            .field("url", &self.url)
            .field("local_addr", &self.local_addr)
            .field("downloads", &self.downloads())
            .finish()
    }
}

#[derive(Debug)]
struct Activity {
    downloads: AtomicU32,
    last_request: Mutex<Instant>,
}

impl Activity {
    fn new() -> Self {
        Self {
            downloads: AtomicU32::new(0),
            last_request: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_request.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_request.lock().unwrap_or_else(PoisonError::into_inner).elapsed()
    }
}

struct ShareState {
    payload: Bytes,
    disposition: HeaderValue,
    token: Option<String>,
    max_downloads: Option<u32>,
    activity: Arc<Activity>,
    stop_tx: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    token: Option<String>,
}

/// GET /download (HEAD is answered too, but never counts as a download)
///
/// A query string that does not parse is treated as carrying no token.
async fn download(
    State(share): State<Arc<ShareState>>,
    method: Method,
    query: Option<Query<DownloadQuery>>,
) -> Response {
    share.activity.touch();

    if let Some(expected) = &share.token {
        let presented = query.as_ref().and_then(|Query(q)| q.token.as_deref());
        if presented != Some(expected.as_str()) {
            tracing::warn!("Rejected download without a valid share token");
            return not_found().await.into_response();
        }
    }

    if method == Method::HEAD {
        let exhausted = share
            .max_downloads
            .is_some_and(|max| share.activity.downloads.load(Ordering::SeqCst) >= max);
        if exhausted {
            return not_found().await.into_response();
        }
        return payload_response(&share);
    }

    let claimed = share.activity.downloads.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |served| {
        match share.max_downloads {
            Some(max) if served >= max => None,
            _ => Some(served + 1),
        }
    });
    let Ok(previous) = claimed else {
        return not_found().await.into_response();
    };

    let served = previous + 1;
    tracing::debug!("Serving download #{} ({} bytes)", served, share.payload.len());

    if share.max_downloads == Some(served) {
        tracing::info!("Download limit of {} reached, closing share", served);
        share.stop_tx.send_replace(true);
    }

    payload_response(&share)
}

fn payload_response(share: &ShareState) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::CONTENT_DISPOSITION, share.disposition.clone()),
        ],
        share.payload.clone(),
    )
        .into_response()
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY)
}

/// Resolves once a stop is requested or every sender is gone.
async fn stopped(mut stop_rx: watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

async fn idle_watchdog(
    idle: Duration,
    activity: Arc<Activity>,
    stop_tx: Arc<watch::Sender<bool>>,
    stop_rx: watch::Receiver<bool>,
) {
    loop {
        let remaining = idle.saturating_sub(activity.idle_for());
        if remaining.is_zero() {
            tracing::info!("Share idle for {:?}, closing", idle);
            stop_tx.send_replace(true);
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(remaining) => {}
            _ = stopped(stop_rx.clone()) => return,
        }
    }
}

fn content_disposition(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| if c == '"' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();

    HeaderValue::from_bytes(format!("attachment; filename=\"{}\"", safe).as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_quotes_filename() {
        let value = content_disposition("greeting.txt");
        assert_eq!(value.to_str().unwrap(), "attachment; filename=\"greeting.txt\"");
    }

    #[test]
    fn test_content_disposition_neutralizes_header_injection() {
        let value = content_disposition("evil\"\r\nSet-Cookie: x.txt");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"evil___Set-Cookie: x.txt\""
        );
    }

    #[test]
    fn test_content_disposition_keeps_utf8_names() {
        let value = content_disposition("résumé.pdf");
        assert_eq!(value.as_bytes(), "attachment; filename=\"résumé.pdf\"".as_bytes());
    }

    #[test]
    fn test_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN * 2);
        assert!(a.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
