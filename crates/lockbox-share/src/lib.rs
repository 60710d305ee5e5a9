//! Ephemeral single-file HTTP sharing.
//!
//! Each call to [`ShareServer::serve`] binds a fresh listener on an
//! OS-assigned port and serves one payload on `GET /download` until the
//! session is stopped, dropped, idles out or reaches its download limit.

pub mod config;
pub mod net;
pub mod server;

pub use config::ShareConfig;
pub use server::{ShareError, ShareServer, ShareSession};
