//! sACN (E1.31) codec.
//!
//! Data packets stack three layers, all big-endian:
//! ```text
//! +------------------+---------------------+--------------------+
//! | Root layer 38 B  | Framing layer 77 B  | DMP layer 11 + N B |
//! +------------------+---------------------+--------------------+
//! ```
//! for a total of 126 + N bytes, N being the clamped DMX length. Universe
//! discovery packets swap the framing/DMP layers for a discovery list of up
//! to 512 universes per page.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::{BufMut, BytesMut};

/// Well-known E1.31 UDP port.
pub const PORT: u16 = 5568;

/// 12-byte ACN packet identifier ("ASC-E1.17" NUL-padded).
pub const ACN_IDENTIFIER: [u8; 12] = [
    0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00,
];

pub const VECTOR_ROOT_DATA: u32 = 0x0000_0004;
pub const VECTOR_ROOT_EXTENDED: u32 = 0x0000_0008;
pub const VECTOR_FRAMING_DATA: u32 = 0x0000_0002;
pub const VECTOR_FRAMING_DISCOVERY: u32 = 0x0000_0002;
pub const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;
pub const VECTOR_UNIVERSE_DISCOVERY_LIST: u32 = 0x0000_0001;

/// Fixed egress priority; this proxy does no priority arbitration.
pub const DEFAULT_PRIORITY: u8 = 100;

/// Universe discovery multicast group.
pub const DISCOVERY_ADDR: SocketAddrV4 =
    SocketAddrV4::new(Ipv4Addr::new(239, 255, 250, 214), PORT);

/// Maximum universes carried by one discovery page.
pub const DISCOVERY_PAGE_SIZE: usize = 512;

const DATA_HEADER: usize = 126;

/// Multicast group for a data universe: `239.255.<hi>.<lo>:5568`.
pub fn multicast_addr(universe: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(
        Ipv4Addr::new(239, 255, (universe >> 8) as u8, (universe & 0xFF) as u8),
        PORT,
    ))
}

/// A decoded E1.31 data frame.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub universe: u16,
    pub sequence: u8,
    pub data: [u8; 512],
}

/// Encode an E1.31 data packet. DMX data is clamped to 512 bytes.
pub fn build_data_packet(
    universe: u16,
    sequence: u8,
    source_name: &str,
    cid: &[u8; 16],
    data: &[u8],
) -> Vec<u8> {
    let len = data.len().min(512);
    let pkt_len = DATA_HEADER + len;

    let mut buf = BytesMut::with_capacity(pkt_len);

    // Root layer (38 bytes).
    buf.put_u16(0x0010); // preamble size
    buf.put_u16(0x0000); // post-amble size
    buf.put_slice(&ACN_IDENTIFIER);
    buf.put_u16(0x7000 | (pkt_len - 16) as u16);
    buf.put_u32(VECTOR_ROOT_DATA);
    buf.put_slice(cid);

    // Framing layer (77 bytes).
    buf.put_u16(0x7000 | (pkt_len - 38) as u16);
    buf.put_u32(VECTOR_FRAMING_DATA);
    put_name(&mut buf, source_name);
    buf.put_u8(DEFAULT_PRIORITY);
    buf.put_u16(0); // sync address
    buf.put_u8(sequence);
    buf.put_u8(0); // options
    buf.put_u16(universe);

    // DMP layer (11 + N bytes).
    buf.put_u16(0x7000 | (11 + len) as u16);
    buf.put_u8(VECTOR_DMP_SET_PROPERTY);
    buf.put_u8(0xA1); // address and data type
    buf.put_u16(0); // first property address
    buf.put_u16(1); // address increment
    buf.put_u16((len + 1) as u16); // property count, start code included
    buf.put_u8(0); // DMX start code
    buf.put_slice(&data[..len]);

    buf.to_vec()
}

/// Decode an E1.31 data packet. Any structural mismatch yields `None`; the
/// caller drops the datagram silently.
pub fn parse_data_packet(buf: &[u8]) -> Option<DataFrame> {
    if buf.len() < DATA_HEADER {
        return None;
    }
    if buf[4..16] != ACN_IDENTIFIER {
        return None;
    }
    if u32::from_be_bytes([buf[18], buf[19], buf[20], buf[21]]) != VECTOR_ROOT_DATA {
        return None;
    }
    if u32::from_be_bytes([buf[40], buf[41], buf[42], buf[43]]) != VECTOR_FRAMING_DATA {
        return None;
    }
    if buf[117] != VECTOR_DMP_SET_PROPERTY {
        return None;
    }

    let universe = u16::from_be_bytes([buf[113], buf[114]]);
    let sequence = buf[111];

    // Property count includes the start code.
    let prop_count = u16::from_be_bytes([buf[123], buf[124]]);
    if prop_count < 1 {
        return None;
    }
    let len = ((prop_count - 1) as usize).min(512);
    if buf.len() < DATA_HEADER + len {
        return None;
    }

    let mut data = [0u8; 512];
    data[..len].copy_from_slice(&buf[DATA_HEADER..DATA_HEADER + len]);

    Some(DataFrame {
        universe,
        sequence,
        data,
    })
}

/// Encode one universe-discovery page. The universe list is clamped to
/// [`DISCOVERY_PAGE_SIZE`] entries; `page`/`last_page` are 0-based.
pub fn build_discovery_packet(
    source_name: &str,
    cid: &[u8; 16],
    page: u8,
    last_page: u8,
    universes: &[u16],
) -> Vec<u8> {
    let count = universes.len().min(DISCOVERY_PAGE_SIZE);
    let pkt_len = 120 + count * 2;

    let mut buf = BytesMut::with_capacity(pkt_len);

    // Root layer.
    buf.put_u16(0x0010);
    buf.put_u16(0x0000);
    buf.put_slice(&ACN_IDENTIFIER);
    buf.put_u16(0x7000 | (pkt_len - 16) as u16);
    buf.put_u32(VECTOR_ROOT_EXTENDED);
    buf.put_slice(cid);

    // Framing layer.
    buf.put_u16(0x7000 | (pkt_len - 38) as u16);
    buf.put_u32(VECTOR_FRAMING_DISCOVERY);
    put_name(&mut buf, source_name);
    buf.put_u32(0); // reserved

    // Universe discovery layer.
    buf.put_u16(0x7000 | (pkt_len - 112) as u16);
    buf.put_u32(VECTOR_UNIVERSE_DISCOVERY_LIST);
    buf.put_u8(page);
    buf.put_u8(last_page);
    for &u in &universes[..count] {
        buf.put_u16(u);
    }

    buf.to_vec()
}

/// 64-byte NUL-padded source name field.
fn put_name(buf: &mut BytesMut, name: &str) {
    let bytes = name.as_bytes();
    let len = bytes.len().min(63);
    buf.put_slice(&bytes[..len]);
    buf.put_bytes(0, 64 - len);
}
