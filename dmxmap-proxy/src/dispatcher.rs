//! Ties received frames to the engine and the engine's outputs to senders.
//!
//! Art-Net routing precedence per destination universe: an explicitly
//! configured target wins, then every discovered node claiming the universe,
//! then the configured broadcast addresses, and finally the frame is dropped
//! with a warning. sACN destinations always multicast and add unicast copies
//! for configured targets.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::Mapping;
use crate::discovery::Discovery;
use crate::remap::Engine;
use crate::sender::{ArtNetSender, SacnSender};
use crate::sources::SourceTable;
use dmxmap_protocol::artnet::DmxPacket;
use dmxmap_protocol::sacn::DataFrame;
use dmxmap_protocol::{Protocol, Universe};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Where an Art-Net output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtNetRoute {
    Target(SocketAddr),
    Nodes(Vec<SocketAddr>),
    Broadcast(Vec<SocketAddr>),
    Drop,
}

/// Pure precedence rule: target, then nodes, then broadcast, then drop.
pub fn resolve_artnet_route(
    target: Option<SocketAddr>,
    nodes: &[(IpAddr, u16)],
    broadcasts: &[SocketAddr],
) -> ArtNetRoute {
    if let Some(addr) = target {
        return ArtNetRoute::Target(addr);
    }
    if !nodes.is_empty() {
        return ArtNetRoute::Nodes(
            nodes
                .iter()
                .map(|(ip, port)| SocketAddr::new(*ip, *port))
                .collect(),
        );
    }
    if !broadcasts.is_empty() {
        return ArtNetRoute::Broadcast(broadcasts.to_vec());
    }
    ArtNetRoute::Drop
}

#[derive(Default)]
struct InputCounters {
    by_src: HashMap<IpAddr, u64>,
    by_universe: HashMap<Universe, u64>,
}

pub struct Dispatcher {
    engine: Arc<Engine>,
    artnet_sender: Arc<ArtNetSender>,
    sacn_sender: Arc<SacnSender>,
    discovery: Arc<Discovery>,
    artnet_targets: HashMap<u16, SocketAddr>,
    sacn_targets: HashMap<u16, Vec<SocketAddr>>,
    broadcasts: Vec<SocketAddr>,
    debug: bool,
    /// Authored mappings, for the periodic traffic report.
    mappings: Vec<Mapping>,
    /// Interval counters, flushed to the log every stats tick.
    input: Mutex<InputCounters>,
    /// Cumulative per-source-universe totals for the status endpoint.
    totals: Mutex<HashMap<Universe, u64>>,
    /// Recently seen senders per universe, expired on the stats tick.
    sources: SourceTable,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<Engine>,
        artnet_sender: Arc<ArtNetSender>,
        sacn_sender: Arc<SacnSender>,
        discovery: Arc<Discovery>,
        artnet_targets: HashMap<u16, SocketAddr>,
        sacn_targets: HashMap<u16, Vec<SocketAddr>>,
        broadcasts: Vec<SocketAddr>,
        mappings: Vec<Mapping>,
        debug: bool,
    ) -> Self {
        Dispatcher {
            engine,
            artnet_sender,
            sacn_sender,
            discovery,
            artnet_targets,
            sacn_targets,
            broadcasts,
            debug,
            mappings,
            input: Mutex::new(InputCounters::default()),
            totals: Mutex::new(HashMap::new()),
            sources: SourceTable::default(),
        }
    }

    pub async fn handle_artnet_dmx(&self, src: SocketAddr, pkt: &DmxPacket) {
        if self.debug {
            debug!(
                "[<-artnet] src={} universe={} seq={} len={}",
                src.ip(),
                pkt.universe,
                pkt.sequence,
                pkt.length
            );
        }
        let universe = Universe::artnet(pkt.universe);
        self.record_input(src.ip(), universe);
        self.dispatch(universe, &pkt.data).await;
    }

    pub async fn handle_sacn_frame(&self, src: SocketAddr, frame: &DataFrame) {
        if self.debug {
            debug!(
                "[<-sacn] src={} universe={} seq={}",
                src.ip(),
                frame.universe,
                frame.sequence
            );
        }
        let universe = Universe::sacn(frame.universe);
        self.record_input(src.ip(), universe);
        self.dispatch(universe, &frame.data).await;
    }

    fn record_input(&self, src: IpAddr, universe: Universe) {
        let mut input = self.input.lock();
        *input.by_src.entry(src).or_insert(0) += 1;
        *input.by_universe.entry(universe).or_insert(0) += 1;
        drop(input);
        *self.totals.lock().entry(universe).or_insert(0) += 1;
        self.sources.record(universe, src);
    }

    async fn dispatch(&self, src: Universe, frame: &[u8; 512]) {
        self.engine.remap(src, frame);
        for out in self.engine.take_dirty() {
            match out.universe.protocol {
                Protocol::Sacn => self.send_sacn(out.universe.number, &out.data).await,
                Protocol::ArtNet => self.send_artnet(out.universe, &out.data).await,
            }
        }
    }

    async fn send_sacn(&self, universe: u16, data: &[u8; 512]) {
        if self.debug {
            debug!("[->sacn] universe={universe}");
        }
        if let Err(e) = self.sacn_sender.send_dmx(universe, data).await {
            warn!("[->sacn] error: universe={universe} err={e}");
        }
        for target in self.sacn_targets.get(&universe).into_iter().flatten() {
            if self.debug {
                debug!("[->sacn] unicast dst={} universe={universe}", target.ip());
            }
            if let Err(e) = self.sacn_sender.send_dmx_unicast(*target, universe, data).await {
                warn!("[->sacn] error: dst={} err={}", target.ip(), e);
            }
        }
    }

    async fn send_artnet(&self, universe: Universe, data: &[u8; 512]) {
        let route = resolve_artnet_route(
            self.artnet_targets.get(&universe.number).copied(),
            &self.discovery.nodes_for_universe(universe),
            &self.broadcasts,
        );
        let addrs = match route {
            ArtNetRoute::Target(addr) => vec![addr],
            ArtNetRoute::Nodes(addrs) => addrs,
            ArtNetRoute::Broadcast(addrs) => addrs,
            ArtNetRoute::Drop => {
                warn!("[->artnet] no route for universe={universe}, dropping");
                return;
            }
        };
        for addr in addrs {
            if self.debug {
                debug!("[->artnet] dst={} universe={universe}", addr.ip());
            }
            if let Err(e) = self
                .artnet_sender
                .send_dmx(addr, universe.number, data)
                .await
            {
                warn!("[->artnet] error: dst={} err={}", addr.ip(), e);
            }
        }
    }

    /// Cumulative per-source-universe frame counts, for the status endpoint.
    pub fn totals(&self) -> HashMap<Universe, u64> {
        self.totals.lock().clone()
    }

    /// Active senders per universe, for the status endpoint.
    pub fn sources(&self) -> Vec<crate::sources::SourceInfo> {
        self.sources.snapshot()
    }

    /// Flush the interval counters and the engine's mapping traffic to the
    /// log every 10 seconds.
    pub async fn run_stats(&self, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(STATS_INTERVAL);
        tick.tick().await; // the immediate first tick has nothing to report
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.print_stats();
                    self.sources.expire();
                }
                _ = shutdown.changed() => return,
            }
        }
    }

    fn print_stats(&self) {
        let counters = {
            let mut input = self.input.lock();
            std::mem::take(&mut *input)
        };

        if !counters.by_src.is_empty() {
            info!("[stats] input by source (last 10s):");
            for (src, count) in &counters.by_src {
                info!("[stats]   {src}: {count} packets");
            }
        }
        if !counters.by_universe.is_empty() {
            info!("[stats] input by universe (last 10s):");
            for (universe, count) in &counters.by_universe {
                info!("[stats]   {universe}: {count} packets");
            }
        }

        if self.mappings.is_empty() {
            return;
        }
        let counts = self.engine.swap_stats();
        info!("[stats] mapping traffic (last 10s):");
        for m in &self.mappings {
            let count = counts.get(&m.from.universe).copied().unwrap_or(0);
            info!("[stats]   {} -> {}: {} packets", m.from, m.to, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn explicit_target_wins() {
        let route = resolve_artnet_route(
            Some(addr("10.0.0.1:6454")),
            &[("10.0.0.2".parse().unwrap(), 6454)],
            &[addr("10.0.0.255:6454")],
        );
        assert_eq!(route, ArtNetRoute::Target(addr("10.0.0.1:6454")));
    }

    #[test]
    fn discovered_nodes_beat_broadcast() {
        let route = resolve_artnet_route(
            None,
            &[
                ("10.0.0.2".parse().unwrap(), 6454),
                ("10.0.0.3".parse().unwrap(), 7000),
            ],
            &[addr("10.0.0.255:6454")],
        );
        assert_eq!(
            route,
            ArtNetRoute::Nodes(vec![addr("10.0.0.2:6454"), addr("10.0.0.3:7000")])
        );
    }

    #[test]
    fn broadcast_is_the_fallback() {
        let route = resolve_artnet_route(None, &[], &[addr("10.0.0.255:6454")]);
        assert_eq!(route, ArtNetRoute::Broadcast(vec![addr("10.0.0.255:6454")]));
    }

    #[test]
    fn no_route_means_drop() {
        assert_eq!(resolve_artnet_route(None, &[], &[]), ArtNetRoute::Drop);
    }
}
