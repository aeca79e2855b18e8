//! dmxmap-proxy: real-time DMX512 remapping proxy.
//!
//! Ingests DMX frames over Art-Net and sACN (E1.31), rewrites them per the
//! configured mapping table, and re-emits the results to discovered or
//! configured receivers. Also speaks the Art-Net poll handshake, both to
//! learn downstream nodes and to advertise itself.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::sync::watch;

mod config;
mod discovery;
mod dispatcher;
mod logging;
mod netif;
mod receiver;
mod remap;
mod sender;
mod sources;
mod web;

use config::Config;
use discovery::Discovery;
use dispatcher::Dispatcher;
use dmxmap_protocol::{artnet, Universe};
use receiver::{ArtNetReceiver, SacnReceiver};
use remap::Engine;
use sender::{ArtNetSender, SacnSender};

const SOURCE_NAME: &str = "dmxmap";
const LONG_NAME: &str = "dmxmap DMX proxy";

/// dmxmap-proxy - DMX512 remapping proxy between Art-Net and sACN
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the mapping configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Art-Net listen address (empty to disable)
    #[arg(long, default_value = "0.0.0.0:6454")]
    artnet_listen: String,

    /// Art-Net broadcast addresses: comma-separated, 'auto' to derive from
    /// interfaces, or empty to disable
    #[arg(long, default_value = "auto")]
    artnet_broadcast: String,

    /// Network interface for sACN multicast (empty lets the OS choose)
    #[arg(long, default_value = "")]
    sacn_interface: String,

    /// HTTP status endpoint listen address (empty to disable)
    #[arg(long, default_value = "0.0.0.0:8080")]
    api_listen: String,

    /// Log incoming and outgoing DMX packets
    #[arg(short, long)]
    debug: bool,

    /// Directory for rotated log files (file logging disabled when unset)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep rotated log files
    #[arg(long, default_value = "7")]
    log_retention_days: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    logging::init_logging(args.log_dir.as_deref(), args.log_retention_days, args.debug)?;

    let cfg = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("config error: {e}");
            return Err(e.into());
        }
    };
    info!(
        "[config] loaded mappings={} targets={}",
        cfg.mappings.len(),
        cfg.targets.len()
    );
    for m in &cfg.mappings {
        info!("[config]   {} -> {}", m.from, m.to);
    }
    for t in &cfg.targets {
        info!("[config]   target {} -> {}", t.universe, t.address);
    }

    let engine = Arc::new(Engine::new(cfg.normalized()));
    let artnet_targets = cfg.artnet_targets();
    let sacn_targets = cfg.sacn_targets();

    // Broadcast addresses: explicit list, interface-derived, or none.
    let broadcasts = match broadcast_addrs(&args.artnet_broadcast) {
        Ok(addrs) => addrs,
        Err(e) => {
            error!("broadcast error: {e}");
            return Err(e.into());
        }
    };
    for b in &broadcasts {
        info!("[config]   broadcast {b}");
    }

    // Poll targets: every explicit Art-Net target plus every broadcast.
    let mut seen = HashSet::new();
    let poll_targets: Vec<SocketAddr> = artnet_targets
        .values()
        .chain(broadcasts.iter())
        .filter(|addr| seen.insert(addr.to_string()))
        .copied()
        .collect();

    // Identity for poll replies.
    let local_ip = broadcasts
        .first()
        .and_then(netif::broadcast_host)
        .and_then(netif::local_ip_for_broadcast)
        .or_else(netif::first_non_loopback_ipv4)
        .unwrap_or(Ipv4Addr::UNSPECIFIED);

    let sacn_if = if args.sacn_interface.is_empty() {
        None
    } else {
        match netif::interface_ipv4(&args.sacn_interface) {
            Some(ip) => Some(ip),
            None => {
                error!("sacn interface error: no IPv4 address on {:?}", args.sacn_interface);
                return Err(format!("unknown interface {:?}", args.sacn_interface).into());
            }
        }
    };

    let artnet_sender = Arc::new(ArtNetSender::new().await?);
    let sacn_sender = Arc::new(SacnSender::new(SOURCE_NAME, sacn_if)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // sACN universe discovery advertises everything we output.
    let dest_sacn = engine.dest_sacn_universes();
    if !dest_sacn.is_empty() {
        for &u in &dest_sacn {
            sacn_sender.register_universe(u);
        }
        let sender = Arc::clone(&sacn_sender);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { sender.run_discovery(rx).await });
    }

    let dest_artnet: Vec<Universe> = engine
        .dest_artnet_universes()
        .into_iter()
        .map(Universe::artnet)
        .collect();
    let discovery = Arc::new(Discovery::new(
        Arc::clone(&artnet_sender),
        poll_targets,
        local_ip,
        [0u8; 6],
        SOURCE_NAME,
        LONG_NAME,
        dest_artnet.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&engine),
        Arc::clone(&artnet_sender),
        Arc::clone(&sacn_sender),
        Arc::clone(&discovery),
        artnet_targets.clone(),
        sacn_targets,
        broadcasts,
        cfg.mappings.clone(),
        args.debug,
    ));

    if !args.artnet_listen.is_empty() {
        let addr = parse_listen_addr(&args.artnet_listen, artnet::PORT)
            .ok_or_else(|| format!("invalid artnet listen address {:?}", args.artnet_listen))?;
        let artnet_receiver = ArtNetReceiver::bind(addr).await?;
        discovery.set_reply_socket(artnet_receiver.socket());

        let dispatcher = Arc::clone(&dispatcher);
        let discovery = Arc::clone(&discovery);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { artnet_receiver.run(dispatcher, discovery, rx).await });
    }

    let source_sacn = engine.source_sacn_universes();
    if !source_sacn.is_empty() {
        let sacn_receiver = SacnReceiver::bind(&source_sacn, sacn_if)?;
        let dispatcher = Arc::clone(&dispatcher);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { sacn_receiver.run(dispatcher, rx).await });
    }

    if !dest_artnet.is_empty() || !artnet_targets.is_empty() {
        let discovery = Arc::clone(&discovery);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { discovery.run(rx).await });
    }

    {
        let dispatcher = Arc::clone(&dispatcher);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run_stats(rx).await });
    }

    if !args.api_listen.is_empty() {
        let addr = parse_listen_addr(&args.api_listen, 8080)
            .ok_or_else(|| format!("invalid api listen address {:?}", args.api_listen))?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let state = Arc::new(web::WebState::new(
            Arc::new(cfg),
            Arc::clone(&discovery),
            Arc::clone(&dispatcher),
        ));
        let rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = web::serve(listener, state, rx).await {
                error!("[api] server error: {e}");
            }
        });
    }

    wait_for_shutdown().await;
    info!("[main] shutting down");
    let _ = shutdown_tx.send(true);

    Ok(())
}

/// Parse listen address forms: `host:port`, `:port` (all interfaces), or a
/// bare host with the default port.
fn parse_listen_addr(s: &str, default_port: u16) -> Option<SocketAddr> {
    if let Some(port) = s.strip_prefix(':') {
        let port: u16 = port.parse().ok()?;
        return Some(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    }
    config::resolve_addr(s, default_port)
}

/// Resolve the `--artnet-broadcast` flag.
fn broadcast_addrs(flag: &str) -> Result<Vec<SocketAddr>, String> {
    if flag.is_empty() {
        return Ok(Vec::new());
    }
    if flag == "auto" {
        return Ok(netif::detect_broadcast_addrs());
    }
    let mut addrs = Vec::new();
    for part in flag.split(',') {
        let part = part.trim();
        let addr = config::resolve_addr(part, artnet::PORT)
            .ok_or_else(|| format!("cannot resolve broadcast address {part:?}"))?;
        addrs.push(addr);
    }
    Ok(addrs)
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_forms() {
        assert_eq!(
            parse_listen_addr(":6454", artnet::PORT),
            Some("0.0.0.0:6454".parse().unwrap())
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:7000", artnet::PORT),
            Some("127.0.0.1:7000".parse().unwrap())
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1", artnet::PORT),
            Some("127.0.0.1:6454".parse().unwrap())
        );
        assert_eq!(parse_listen_addr(":notaport", artnet::PORT), None);
    }

    #[test]
    fn broadcast_flag_forms() {
        assert!(broadcast_addrs("").unwrap().is_empty());
        assert_eq!(
            broadcast_addrs("10.0.0.255, 10.0.1.255:7000").unwrap(),
            vec![
                "10.0.0.255:6454".parse().unwrap(),
                "10.0.1.255:7000".parse().unwrap(),
            ]
        );
        assert!(broadcast_addrs("not an address").is_err());
    }
}
