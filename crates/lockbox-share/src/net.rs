use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Public address used only to select a route; no packet is sent.
const ROUTE_PROBE: (&str, u16) = ("8.8.8.8", 80);

/// Best-effort guess at the address other LAN hosts can reach us on.
///
/// Tries the outbound route first, then the first non-loopback IPv4
/// interface, and finally falls back to loopback.
pub fn advertised_ip() -> IpAddr {
    outbound_ip()
        .or_else(first_lan_ipv4)
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Local endpoint of a UDP socket "connected" toward a public address.
pub fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(ROUTE_PROBE).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

pub fn first_lan_ipv4() -> Option<IpAddr> {
    let mut ips: Vec<IpAddr> = if_addrs::get_if_addrs()
        .ok()?
        .into_iter()
        .filter(|ifa| !ifa.is_loopback())
        .map(|ifa| ifa.ip())
        .filter(|ip| ip.is_ipv4())
        .collect();

    ips.sort();
    ips.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertised_ip_is_usable() {
        let ip = advertised_ip();
        assert!(!ip.is_unspecified());
        assert!(!ip.is_multicast());
    }
}
