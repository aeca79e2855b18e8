//! Network interface helpers: broadcast auto-detection and interface lookup.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use if_addrs::{IfAddr, Ifv4Addr};

use dmxmap_protocol::artnet;

fn ipv4_interfaces() -> Vec<(String, Ifv4Addr)> {
    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return Vec::new();
    };
    interfaces
        .into_iter()
        .filter(|i| !i.is_loopback())
        .filter_map(|i| match i.addr {
            IfAddr::V4(v4) => Some((i.name, v4)),
            _ => None,
        })
        .collect()
}

/// Broadcast address of every up, non-loopback IPv4 interface, deduplicated,
/// on the Art-Net port.
pub fn detect_broadcast_addrs() -> Vec<SocketAddr> {
    let mut seen: HashSet<Ipv4Addr> = HashSet::new();
    let mut result = Vec::new();
    for (_, v4) in ipv4_interfaces() {
        if let Some(broadcast) = v4.broadcast {
            if seen.insert(broadcast) {
                result.push(SocketAddr::from((broadcast, artnet::PORT)));
            }
        }
    }
    result
}

/// IPv4 address of the named interface, for multicast interface selection.
pub fn interface_ipv4(name: &str) -> Option<Ipv4Addr> {
    ipv4_interfaces()
        .into_iter()
        .find(|(ifname, _)| ifname == name)
        .map(|(_, v4)| v4.ip)
}

/// Local address of the interface whose broadcast matches, for
/// self-identification in poll replies.
pub fn local_ip_for_broadcast(broadcast: Ipv4Addr) -> Option<Ipv4Addr> {
    ipv4_interfaces()
        .into_iter()
        .find(|(_, v4)| v4.broadcast == Some(broadcast))
        .map(|(_, v4)| v4.ip)
}

/// First non-loopback IPv4 address, the fallback identity when no broadcast
/// is configured.
pub fn first_non_loopback_ipv4() -> Option<Ipv4Addr> {
    ipv4_interfaces().into_iter().map(|(_, v4)| v4.ip).next()
}

/// Extract the IPv4 broadcast host from a configured broadcast endpoint.
pub fn broadcast_host(addr: &SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}
