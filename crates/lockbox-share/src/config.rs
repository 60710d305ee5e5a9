use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Address the share listener binds to (all interfaces by default)
    pub bind_addr: IpAddr,

    /// Port to bind; 0 lets the OS pick an ephemeral port
    pub port: u16,

    /// Host placed in share URLs. Detected from the routing table when unset.
    pub advertise_ip: Option<IpAddr>,

    /// Stop a session after this many seconds without requests
    pub idle_timeout_secs: Option<u64>,

    /// Stop a session after this many completed downloads
    pub max_downloads: Option<u32>,

    /// Require a one-time random token in the download URL
    pub require_token: bool,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            advertise_ip: None,
            idle_timeout_secs: Some(15 * 60),
            max_downloads: None,
            require_token: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: ShareConfig = serde_json::from_str(r#"{"max_downloads": 3}"#).unwrap();
        assert_eq!(cfg.max_downloads, Some(3));
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.idle_timeout_secs, Some(900));
        assert!(!cfg.require_token);
    }
}
