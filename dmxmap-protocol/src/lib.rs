//! Wire formats for the dmxmap DMX512 proxy.
//!
//! This crate holds everything that touches bytes on the wire and nothing
//! that touches sockets:
//!
//! - [`universe`]: the protocol-qualified universe and channel address model
//!   shared by the configuration and both codecs.
//! - [`artnet`]: Art-Net ArtDmx / ArtPoll / ArtPollReply encode and decode.
//! - [`sacn`]: sACN (E1.31) data and universe-discovery encode and decode.
//!
//! Both codecs are bit-exact and allocation-light; decoders never panic on
//! adversarial input, they return an error (Art-Net) or `None` (sACN) and the
//! receiver drops the datagram.
//!
//! # Example
//!
//! ```rust
//! use dmxmap_protocol::artnet::{build_dmx, parse_packet, ArtPacket};
//!
//! let wire = build_dmx(3, 1, &[10, 20, 30, 40]);
//! match parse_packet(&wire).unwrap() {
//!     ArtPacket::Dmx(pkt) => assert_eq!(pkt.universe, 3),
//!     _ => unreachable!(),
//! }
//! ```

pub mod artnet;
pub mod error;
pub mod sacn;
pub mod universe;

pub use error::{AddressError, ProtocolError};
pub use universe::{FromAddress, Protocol, ToAddress, Universe};
