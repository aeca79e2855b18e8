//! sACN multicast receiver.
//!
//! One socket bound to port 5568 joins the multicast group of every source
//! universe in the mapping table.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::Arc;

use log::{info, warn};
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::dispatcher::Dispatcher;
use dmxmap_protocol::sacn;

/// Maximum E1.31 data packet: 126-byte header plus a full universe.
const MAX_PACKET: usize = 638;

pub struct SacnReceiver {
    socket: Arc<UdpSocket>,
}

impl SacnReceiver {
    /// Bind port 5568 and join one multicast group per source universe on
    /// the given interface (any interface when `None`).
    pub fn bind(universes: &[u16], multicast_if: Option<Ipv4Addr>) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(SockProtocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind = SocketAddr::from((Ipv4Addr::UNSPECIFIED, sacn::PORT));
        socket.bind(&bind.into())?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(StdUdpSocket::from(socket))?;

        let iface = multicast_if.unwrap_or(Ipv4Addr::UNSPECIFIED);
        for &u in universes {
            let group = Ipv4Addr::new(239, 255, (u >> 8) as u8, (u & 0xFF) as u8);
            socket.join_multicast_v4(group, iface)?;
        }
        info!("[sacn] listening universes={universes:?}");

        Ok(SacnReceiver {
            socket: Arc::new(socket),
        })
    }

    /// Receive loop; structural decode mismatches are dropped silently.
    pub async fn run(&self, dispatcher: Arc<Dispatcher>, mut shutdown: watch::Receiver<bool>) {
        let mut buf = [0u8; MAX_PACKET];
        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((n, src)) => {
                        if let Some(frame) = sacn::parse_data_packet(&buf[..n]) {
                            dispatcher.handle_sacn_frame(src, &frame).await;
                        }
                    }
                    Err(e) => warn!("[sacn] read error: {e}"),
                },
                _ = shutdown.changed() => return,
            }
        }
    }
}
