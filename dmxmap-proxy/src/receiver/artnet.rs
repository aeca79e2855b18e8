//! Art-Net UDP receiver.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::discovery::Discovery;
use crate::dispatcher::Dispatcher;
use dmxmap_protocol::artnet::{parse_packet, ArtPacket};

pub struct ArtNetReceiver {
    socket: Arc<UdpSocket>,
}

impl ArtNetReceiver {
    /// Bind the Art-Net listen socket (normally port 6454).
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        info!("[artnet] listening addr={}", socket.local_addr()?);
        Ok(ArtNetReceiver {
            socket: Arc::new(socket),
        })
    }

    /// The listen socket, shared so poll replies leave from port 6454.
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Receive loop. Decode failures are dropped silently; read errors are
    /// logged and the loop continues.
    pub async fn run(
        &self,
        dispatcher: Arc<Dispatcher>,
        discovery: Arc<Discovery>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((n, src)) => {
                        self.handle(&buf[..n], src, &dispatcher, &discovery).await;
                    }
                    Err(e) => warn!("[artnet] read error: {e}"),
                },
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn handle(
        &self,
        datagram: &[u8],
        src: SocketAddr,
        dispatcher: &Dispatcher,
        discovery: &Discovery,
    ) {
        match parse_packet(datagram) {
            Ok(ArtPacket::Dmx(pkt)) => dispatcher.handle_artnet_dmx(src, &pkt).await,
            Ok(ArtPacket::Poll(_)) => {
                debug!("[<-artnet] poll src={}", src.ip());
                discovery.handle_poll(src).await;
            }
            Ok(ArtPacket::PollReply(pkt)) => {
                debug!("[<-artnet] pollreply src={}", src.ip());
                discovery.handle_poll_reply(src, &pkt);
            }
            Ok(ArtPacket::Unknown(op)) => {
                debug!("[<-artnet] ignoring opcode=0x{op:04X} src={}", src.ip());
            }
            Err(e) => {
                debug!("[<-artnet] dropping malformed packet from {}: {e}", src.ip());
            }
        }
    }
}
