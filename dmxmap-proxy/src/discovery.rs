//! Art-Net node discovery.
//!
//! The proxy polls its targets every 10 seconds, aggregates the replies into
//! a node table keyed by peer IP, and answers polls with its own reply so
//! peers learn what this node outputs. Multi-port devices answer one poll
//! with several replies (one per group of four ports); their universes are
//! unioned, so reply order never shrinks a node's universe set. Nodes unseen
//! for 60 seconds are dropped by a 30-second cleanup tick.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::sender::ArtNetSender;
use dmxmap_protocol::artnet::PollReplyPacket;
use dmxmap_protocol::Universe;

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
pub const NODE_EXPIRY: Duration = Duration::from_secs(60);

/// A discovered Art-Net node.
#[derive(Debug, Clone)]
pub struct Node {
    pub ip: IpAddr,
    /// Port advertised in the reply, not the UDP source port.
    pub port: u16,
    pub short_name: String,
    pub long_name: String,
    pub universes: Vec<Universe>,
    pub last_seen: Instant,
}

/// The node table. Reads are the dispatcher hot path; writes come from
/// replies and cleanup.
#[derive(Default)]
pub struct NodeTable {
    nodes: RwLock<HashMap<IpAddr, Node>>,
}

impl NodeTable {
    /// Fold one PollReply into the table: upsert the node, union its
    /// universes, refresh names and last-seen.
    pub fn observe_reply(&self, ip: IpAddr, reply: &PollReplyPacket) {
        let universes = reply.output_universes();
        let mut nodes = self.nodes.write();

        match nodes.get_mut(&ip) {
            Some(node) => {
                let before = node.universes.len();
                for u in universes {
                    if !node.universes.contains(&u) {
                        node.universes.push(u);
                    }
                }
                node.short_name = reply.short_name();
                node.long_name = reply.long_name();
                node.port = reply.port;
                node.last_seen = Instant::now();
                if node.universes.len() != before {
                    info!(
                        "[artnet] node updated ip={} name={} universes={:?}",
                        ip,
                        node.short_name,
                        node.universes.iter().map(|u| u.to_string()).collect::<Vec<_>>()
                    );
                }
            }
            None => {
                let node = Node {
                    ip,
                    port: reply.port,
                    short_name: reply.short_name(),
                    long_name: reply.long_name(),
                    universes,
                    last_seen: Instant::now(),
                };
                info!(
                    "[artnet] node discovered ip={} name={} universes={:?}",
                    ip,
                    node.short_name,
                    node.universes.iter().map(|u| u.to_string()).collect::<Vec<_>>()
                );
                nodes.insert(ip, node);
            }
        }
    }

    /// Every node claiming the given universe.
    pub fn nodes_for_universe(&self, universe: Universe) -> Vec<(IpAddr, u16)> {
        self.nodes
            .read()
            .values()
            .filter(|n| n.universes.contains(&universe))
            .map(|n| (n.ip, n.port))
            .collect()
    }

    /// Drop nodes last seen before the cutoff.
    pub fn expire_older_than(&self, cutoff: Instant) {
        self.nodes.write().retain(|ip, node| {
            let keep = node.last_seen >= cutoff;
            if !keep {
                info!("[artnet] node timeout ip={} name={}", ip, node.short_name);
            }
            keep
        });
    }

    /// Clone of the current table, for the status endpoint.
    pub fn snapshot(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }
}

pub struct Discovery {
    sender: Arc<ArtNetSender>,
    table: NodeTable,
    poll_targets: Vec<SocketAddr>,
    local_ip: Ipv4Addr,
    mac: [u8; 6],
    short_name: String,
    long_name: String,
    /// Universes this proxy outputs, advertised in poll replies.
    output_universes: Vec<Universe>,
    /// Listen socket for replies, so they leave from port 6454.
    reply_socket: Mutex<Option<Arc<UdpSocket>>>,
}

impl Discovery {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender: Arc<ArtNetSender>,
        poll_targets: Vec<SocketAddr>,
        local_ip: Ipv4Addr,
        mac: [u8; 6],
        short_name: &str,
        long_name: &str,
        output_universes: Vec<Universe>,
    ) -> Self {
        Discovery {
            sender,
            table: NodeTable::default(),
            poll_targets,
            local_ip,
            mac,
            short_name: short_name.to_string(),
            long_name: long_name.to_string(),
            output_universes,
            reply_socket: Mutex::new(None),
        }
    }

    /// Route poll replies through the Art-Net listen socket.
    pub fn set_reply_socket(&self, socket: Arc<UdpSocket>) {
        *self.reply_socket.lock() = Some(socket);
    }

    /// Poll and cleanup loop. The first poll fires immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut poll_tick = tokio::time::interval(POLL_INTERVAL);
        let mut cleanup_tick = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            tokio::select! {
                _ = poll_tick.tick() => self.send_polls().await,
                _ = cleanup_tick.tick() => self.cleanup(),
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn send_polls(&self) {
        for target in &self.poll_targets {
            if let Err(e) = self.sender.send_poll(*target).await {
                warn!("[->artnet] poll error: dst={} err={}", target, e);
            }
        }
    }

    fn cleanup(&self) {
        if let Some(cutoff) = Instant::now().checked_sub(NODE_EXPIRY) {
            self.table.expire_older_than(cutoff);
        }
    }

    /// Answer an ArtPoll with this proxy's reply.
    pub async fn handle_poll(&self, src: SocketAddr) {
        let via = self.reply_socket.lock().clone();
        if let Err(e) = self
            .sender
            .send_poll_reply(
                via.as_deref(),
                src,
                self.local_ip.octets(),
                self.mac,
                &self.short_name,
                &self.long_name,
                &self.output_universes,
            )
            .await
        {
            warn!("[->artnet] pollreply error: dst={} err={}", src, e);
        }
    }

    /// Fold a peer's ArtPollReply into the node table. Our own replies are
    /// ignored.
    pub fn handle_poll_reply(&self, src: SocketAddr, reply: &PollReplyPacket) {
        if src.ip() == IpAddr::V4(self.local_ip) {
            return;
        }
        self.table.observe_reply(src.ip(), reply);
    }

    pub fn nodes_for_universe(&self, universe: Universe) -> Vec<(IpAddr, u16)> {
        self.table.nodes_for_universe(universe)
    }

    pub fn snapshot(&self) -> Vec<Node> {
        self.table.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmxmap_protocol::artnet::{build_poll_reply, parse_packet, ArtPacket};

    fn reply(universes: &[Universe]) -> PollReplyPacket {
        let wire = build_poll_reply([10, 0, 0, 5], [0; 6], "node", "test node", universes);
        match parse_packet(&wire).unwrap() {
            ArtPacket::PollReply(pkt) => pkt,
            other => panic!("expected PollReply, got {:?}", other),
        }
    }

    fn art(n: u16) -> Universe {
        Universe::artnet(n)
    }

    #[test]
    fn replies_accumulate_universes() {
        let table = NodeTable::default();
        let ip: IpAddr = "10.0.0.5".parse().unwrap();

        table.observe_reply(ip, &reply(&[art(0), art(1)]));
        table.observe_reply(ip, &reply(&[art(2), art(3)]));

        let nodes = table.snapshot();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].universes, vec![art(0), art(1), art(2), art(3)]);

        assert_eq!(table.nodes_for_universe(art(2)), vec![(ip, 6454)]);
        assert!(table.nodes_for_universe(art(9)).is_empty());
    }

    #[test]
    fn accumulation_is_order_independent() {
        let a = reply(&[art(0), art(1)]);
        let b = reply(&[art(1), art(2)]);
        let ip: IpAddr = "10.0.0.5".parse().unwrap();

        let forward = NodeTable::default();
        forward.observe_reply(ip, &a);
        forward.observe_reply(ip, &b);

        let backward = NodeTable::default();
        backward.observe_reply(ip, &b);
        backward.observe_reply(ip, &a);

        let mut set_f = forward.snapshot()[0].universes.clone();
        let mut set_b = backward.snapshot()[0].universes.clone();
        set_f.sort();
        set_b.sort();
        assert_eq!(set_f, set_b);
    }

    #[test]
    fn distinct_peers_stay_distinct() {
        let table = NodeTable::default();
        table.observe_reply("10.0.0.5".parse().unwrap(), &reply(&[art(0)]));
        table.observe_reply("10.0.0.6".parse().unwrap(), &reply(&[art(0)]));

        assert_eq!(table.snapshot().len(), 2);
        assert_eq!(table.nodes_for_universe(art(0)).len(), 2);
    }

    #[test]
    fn expiry_drops_stale_nodes() {
        let table = NodeTable::default();
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        table.observe_reply(ip, &reply(&[art(0)]));

        // Cutoff in the past keeps the node, cutoff past its last-seen
        // removes it.
        if let Some(cutoff) = Instant::now().checked_sub(Duration::from_secs(120)) {
            table.expire_older_than(cutoff);
        }
        assert_eq!(table.snapshot().len(), 1);

        table.expire_older_than(Instant::now() + Duration::from_secs(1));
        assert!(table.snapshot().is_empty());
    }

    #[test]
    fn names_and_port_follow_the_latest_reply() {
        let table = NodeTable::default();
        let ip: IpAddr = "10.0.0.5".parse().unwrap();

        table.observe_reply(ip, &reply(&[art(0)]));
        let mut renamed = reply(&[art(0)]);
        renamed.short_name = [0; 18];
        renamed.short_name[..5].copy_from_slice(b"fresh");
        table.observe_reply(ip, &renamed);

        assert_eq!(table.snapshot()[0].short_name, "fresh");
    }
}
