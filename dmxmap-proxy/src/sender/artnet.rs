//! Art-Net sender.
//!
//! One ephemeral UDP socket with broadcast enabled, shared by DMX output,
//! polls, and poll replies. Sequence numbers are tracked per destination
//! universe and skip zero, which the protocol reserves for "sequencing
//! disabled".

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;

use dmxmap_protocol::artnet::{build_dmx, build_poll, build_poll_reply};
use dmxmap_protocol::Universe;

/// Per-universe ArtDmx sequence counters: 1-255 cycling, never 0.
#[derive(Default)]
pub(crate) struct ArtSequences {
    counters: Mutex<HashMap<u16, u8>>,
}

impl ArtSequences {
    pub(crate) fn next(&self, universe: u16) -> u8 {
        let mut counters = self.counters.lock();
        let seq = counters.entry(universe).or_insert(0);
        *seq = seq.wrapping_add(1);
        if *seq == 0 {
            *seq = 1;
        }
        *seq
    }
}

pub struct ArtNetSender {
    socket: Arc<UdpSocket>,
    sequences: ArtSequences,
}

impl ArtNetSender {
    /// Bind an ephemeral sending socket with broadcast enabled.
    pub async fn new() -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;
        Ok(ArtNetSender {
            socket: Arc::new(socket),
            sequences: ArtSequences::default(),
        })
    }

    /// Send an ArtDmx frame to one destination.
    pub async fn send_dmx(&self, addr: SocketAddr, universe: u16, data: &[u8]) -> io::Result<()> {
        let seq = self.sequences.next(universe);
        let pkt = build_dmx(universe, seq, data);
        self.socket.send_to(&pkt, addr).await?;
        Ok(())
    }

    /// Send an ArtPoll to one poll target.
    pub async fn send_poll(&self, addr: SocketAddr) -> io::Result<()> {
        self.socket.send_to(&build_poll(), addr).await?;
        Ok(())
    }

    /// Send an ArtPollReply, optionally through a caller-supplied socket so
    /// the reply leaves from port 6454.
    pub async fn send_poll_reply(
        &self,
        via: Option<&UdpSocket>,
        addr: SocketAddr,
        ip: [u8; 4],
        mac: [u8; 6],
        short_name: &str,
        long_name: &str,
        universes: &[Universe],
    ) -> io::Result<()> {
        let pkt = build_poll_reply(ip, mac, short_name, long_name, universes);
        via.unwrap_or(&*self.socket).send_to(&pkt, addr).await?;
        Ok(())
    }
}
