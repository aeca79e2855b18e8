//! sACN (E1.31) sender.
//!
//! DMX data goes to the per-universe multicast group, with optional unicast
//! copies for configured targets. Registered universes are advertised on the
//! discovery group every 10 seconds in pages of up to 512. The CID is random
//! per sender and stable for its lifetime; sequence numbers are per-universe
//! free-running u8 counters, wrapping 255 to 0 as E1.31 prescribes.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use uuid::Uuid;

use dmxmap_protocol::sacn::{
    build_data_packet, build_discovery_packet, multicast_addr, DISCOVERY_ADDR,
    DISCOVERY_PAGE_SIZE,
};

const DISCOVERY_INTERVAL: Duration = Duration::from_secs(10);

/// Per-universe E1.31 sequence counters: free-running, 255 wraps to 0.
#[derive(Default)]
pub(crate) struct SacnSequences {
    counters: Mutex<HashMap<u16, u8>>,
}

impl SacnSequences {
    pub(crate) fn next(&self, universe: u16) -> u8 {
        let mut counters = self.counters.lock();
        let seq = counters.entry(universe).or_insert(0);
        let current = *seq;
        *seq = seq.wrapping_add(1);
        current
    }
}

pub struct SacnSender {
    socket: Arc<UdpSocket>,
    source_name: String,
    cid: [u8; 16],
    sequences: SacnSequences,
    universes: Mutex<BTreeSet<u16>>,
}

impl SacnSender {
    /// Bind an ephemeral sending socket. When `multicast_if` is given, all
    /// multicast egress uses that interface; otherwise the OS routes.
    pub fn new(source_name: &str, multicast_if: Option<Ipv4Addr>) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(SockProtocol::UDP))?;
        if let Some(iface) = multicast_if {
            socket.set_multicast_if_v4(&iface)?;
        }
        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
        socket.bind(&bind.into())?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(StdUdpSocket::from(socket))?;

        Ok(SacnSender {
            socket: Arc::new(socket),
            source_name: source_name.to_string(),
            cid: *Uuid::new_v4().as_bytes(),
            sequences: SacnSequences::default(),
            universes: Mutex::new(BTreeSet::new()),
        })
    }

    /// Send one universe's frame to its multicast group.
    pub async fn send_dmx(&self, universe: u16, data: &[u8]) -> io::Result<()> {
        let seq = self.sequences.next(universe);
        let pkt = build_data_packet(universe, seq, &self.source_name, &self.cid, data);
        self.socket.send_to(&pkt, multicast_addr(universe)).await?;
        Ok(())
    }

    /// Send one universe's frame to a single unicast target.
    pub async fn send_dmx_unicast(
        &self,
        addr: SocketAddr,
        universe: u16,
        data: &[u8],
    ) -> io::Result<()> {
        let seq = self.sequences.next(universe);
        let pkt = build_data_packet(universe, seq, &self.source_name, &self.cid, data);
        self.socket.send_to(&pkt, addr).await?;
        Ok(())
    }

    /// Add a universe to the discovery advertisement.
    pub fn register_universe(&self, universe: u16) {
        self.universes.lock().insert(universe);
    }

    /// Advertise registered universes on the discovery group until shutdown.
    pub async fn run_discovery(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(DISCOVERY_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => self.send_discovery().await,
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn send_discovery(&self) {
        let universes: Vec<u16> = self.universes.lock().iter().copied().collect();
        if universes.is_empty() {
            return;
        }

        let total_pages = (universes.len() + DISCOVERY_PAGE_SIZE - 1) / DISCOVERY_PAGE_SIZE;
        let last_page = (total_pages - 1) as u8;
        for (page, chunk) in universes.chunks(DISCOVERY_PAGE_SIZE).enumerate() {
            let pkt = build_discovery_packet(
                &self.source_name,
                &self.cid,
                page as u8,
                last_page,
                chunk,
            );
            if let Err(e) = self.socket.send_to(&pkt, SocketAddr::V4(DISCOVERY_ADDR)).await {
                warn!("[->sacn] discovery send error: {e}");
                return;
            }
        }
        debug!(
            "[->sacn] discovery universes={} pages={}",
            universes.len(),
            total_pages
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_free_run_and_wrap_to_zero() {
        let seqs = SacnSequences::default();

        assert_eq!(seqs.next(1), 0);
        assert_eq!(seqs.next(1), 1);

        for expected in 2..=255u16 {
            assert_eq!(u16::from(seqs.next(1)), expected);
        }
        // 255 wraps straight to 0, no skip.
        assert_eq!(seqs.next(1), 0);
    }

    #[test]
    fn sequences_are_independent_per_universe() {
        let seqs = SacnSequences::default();
        seqs.next(1);
        seqs.next(1);
        assert_eq!(seqs.next(2), 0);
    }
}
