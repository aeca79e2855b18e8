//! Art-Net codec.
//!
//! Packet layout (ArtDmx):
//! ```text
//! +----------+--------+---------+-----+------+----------+--------+----------+
//! | ID       | OpCode | ProtVer | Seq | Phys | Universe | Length | Data     |
//! | Art-Net\0| u16 LE | u16 BE  | u8  | u8   | u16 LE   | u16 BE | 2-512 B  |
//! +----------+--------+---------+-----+------+----------+--------+----------+
//! | 8 bytes  | 2      | 2       | 1   | 1    | 2        | 2      | Length   |
//! +----------+--------+---------+-----+------+----------+--------+----------+
//! ```
//!
//! The opcode and universe are little-endian; every other multi-byte field is
//! big-endian. Only Poll (0x2000), PollReply (0x2100) and Dmx (0x5000) are
//! understood; anything else decodes to [`ArtPacket::Unknown`] so receivers
//! can drop it without logging.

use bytes::{BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::universe::Universe;

/// Well-known Art-Net UDP port.
pub const PORT: u16 = 6454;

/// 8-byte packet identifier, NUL included.
pub const ARTNET_ID: [u8; 8] = *b"Art-Net\0";

pub const OP_POLL: u16 = 0x2000;
pub const OP_POLL_REPLY: u16 = 0x2100;
pub const OP_DMX: u16 = 0x5000;

/// Art-Net 4 protocol revision.
pub const PROTOCOL_VERSION: u16 = 14;

/// Fixed ArtPollReply template size emitted by [`build_poll_reply`].
pub const POLL_REPLY_SIZE: usize = 239;

/// Minimum ArtPollReply length accepted by the decoder.
const POLL_REPLY_MIN: usize = 207;

const DMX_HEADER: usize = 18;
const POLL_MIN: usize = 14;
const ID_AND_OP: usize = 10;

/// An ArtDmx frame (opcode 0x5000).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmxPacket {
    pub version: u16,
    /// 1-255 cycling; 0 means the sender disabled sequencing.
    pub sequence: u8,
    pub physical: u8,
    /// Raw 15-bit port address, wire order (little-endian).
    pub universe: u16,
    /// Declared data length, already clamped to 512.
    pub length: u16,
    pub data: [u8; 512],
}

/// An ArtPoll frame (opcode 0x2000).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPacket {
    pub version: u16,
    pub flags: u8,
    pub diag_priority: u8,
}

/// An ArtPollReply frame (opcode 0x2100).
#[derive(Debug, Clone)]
pub struct PollReplyPacket {
    pub ip: [u8; 4],
    pub port: u16,
    pub version: u16,
    pub net_switch: u8,
    pub sub_switch: u8,
    pub oem: u16,
    pub ubea_version: u8,
    pub status1: u8,
    pub esta_man: u16,
    pub short_name: [u8; 18],
    pub long_name: [u8; 64],
    pub node_report: [u8; 64],
    pub num_ports: u16,
    pub port_types: [u8; 4],
    pub good_input: [u8; 4],
    pub good_output: [u8; 4],
    pub sw_in: [u8; 4],
    pub sw_out: [u8; 4],
    pub style: u8,
    pub mac: [u8; 6],
    pub bind_ip: [u8; 4],
    pub bind_index: u8,
    pub status2: u8,
}

impl PollReplyPacket {
    /// Short name with NUL padding stripped.
    pub fn short_name(&self) -> String {
        trim_name(&self.short_name)
    }

    /// Long name with NUL padding stripped.
    pub fn long_name(&self) -> String {
        trim_name(&self.long_name)
    }

    /// Output universes advertised by this reply: one per DMX-capable port
    /// descriptor (up to 4), combined with the net/subnet switches.
    pub fn output_universes(&self) -> Vec<Universe> {
        let ports = (self.num_ports as usize).min(4);
        (0..ports)
            .filter(|&i| self.port_types[i] & 0x80 != 0)
            .map(|i| Universe::from_art_parts(self.net_switch, self.sub_switch, self.sw_out[i]))
            .collect()
    }
}

fn trim_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// A decoded Art-Net packet.
#[derive(Debug, Clone)]
pub enum ArtPacket {
    Dmx(DmxPacket),
    Poll(PollPacket),
    PollReply(PollReplyPacket),
    /// Valid header, opcode this proxy does not speak.
    Unknown(u16),
}

/// Decode a raw datagram.
pub fn parse_packet(data: &[u8]) -> Result<ArtPacket, ProtocolError> {
    if data.len() < ID_AND_OP {
        return Err(ProtocolError::TooShort {
            expected: ID_AND_OP,
            actual: data.len(),
        });
    }
    if data[..8] != ARTNET_ID {
        return Err(ProtocolError::InvalidIdentifier);
    }

    let opcode = u16::from_le_bytes([data[8], data[9]]);
    match opcode {
        OP_DMX => parse_dmx(data).map(ArtPacket::Dmx),
        OP_POLL => parse_poll(data).map(ArtPacket::Poll),
        OP_POLL_REPLY => parse_poll_reply(data).map(ArtPacket::PollReply),
        other => Ok(ArtPacket::Unknown(other)),
    }
}

fn parse_dmx(data: &[u8]) -> Result<DmxPacket, ProtocolError> {
    if data.len() < DMX_HEADER {
        return Err(ProtocolError::TooShort {
            expected: DMX_HEADER,
            actual: data.len(),
        });
    }

    let declared = u16::from_be_bytes([data[16], data[17]]);
    let length = declared.min(512);
    let payload = &data[DMX_HEADER..];
    if payload.len() < length as usize {
        return Err(ProtocolError::Truncated {
            declared: length as usize,
            actual: payload.len(),
        });
    }

    let mut dmx = [0u8; 512];
    dmx[..length as usize].copy_from_slice(&payload[..length as usize]);

    Ok(DmxPacket {
        version: u16::from_be_bytes([data[10], data[11]]),
        sequence: data[12],
        physical: data[13],
        universe: u16::from_le_bytes([data[14], data[15]]),
        length,
        data: dmx,
    })
}

fn parse_poll(data: &[u8]) -> Result<PollPacket, ProtocolError> {
    if data.len() < POLL_MIN {
        return Err(ProtocolError::TooShort {
            expected: POLL_MIN,
            actual: data.len(),
        });
    }
    Ok(PollPacket {
        version: u16::from_be_bytes([data[10], data[11]]),
        flags: data[12],
        diag_priority: data[13],
    })
}

fn parse_poll_reply(data: &[u8]) -> Result<PollReplyPacket, ProtocolError> {
    if data.len() < POLL_REPLY_MIN {
        return Err(ProtocolError::TooShort {
            expected: POLL_REPLY_MIN,
            actual: data.len(),
        });
    }

    let mut pkt = PollReplyPacket {
        ip: [0; 4],
        port: u16::from_le_bytes([data[14], data[15]]),
        version: u16::from_be_bytes([data[16], data[17]]),
        net_switch: data[18],
        sub_switch: data[19],
        oem: u16::from_be_bytes([data[20], data[21]]),
        ubea_version: data[22],
        status1: data[23],
        esta_man: u16::from_le_bytes([data[24], data[25]]),
        short_name: [0; 18],
        long_name: [0; 64],
        node_report: [0; 64],
        num_ports: u16::from_be_bytes([data[172], data[173]]),
        port_types: [0; 4],
        good_input: [0; 4],
        good_output: [0; 4],
        sw_in: [0; 4],
        sw_out: [0; 4],
        style: data[200],
        mac: [0; 6],
        bind_ip: [0; 4],
        bind_index: 0,
        status2: 0,
    };
    pkt.ip.copy_from_slice(&data[10..14]);
    pkt.short_name.copy_from_slice(&data[26..44]);
    pkt.long_name.copy_from_slice(&data[44..108]);
    pkt.node_report.copy_from_slice(&data[108..172]);
    pkt.port_types.copy_from_slice(&data[174..178]);
    pkt.good_input.copy_from_slice(&data[178..182]);
    pkt.good_output.copy_from_slice(&data[182..186]);
    pkt.sw_in.copy_from_slice(&data[186..190]);
    pkt.sw_out.copy_from_slice(&data[190..194]);
    pkt.mac.copy_from_slice(&data[201..207]);
    // Binding fields trail the minimum length; absent in minimal replies.
    if data.len() >= 214 {
        pkt.bind_ip.copy_from_slice(&data[207..211]);
        pkt.bind_index = data[212];
        pkt.status2 = data[213];
    }
    Ok(pkt)
}

/// Encode an ArtDmx frame. Data is clamped to 512 bytes and the wire length
/// rounded up to the next even number, zero-padding one byte when needed.
pub fn build_dmx(universe: u16, sequence: u8, data: &[u8]) -> Vec<u8> {
    let len = data.len().min(512);
    let wire_len = len + (len & 1);

    let mut buf = BytesMut::with_capacity(DMX_HEADER + wire_len);
    buf.put_slice(&ARTNET_ID);
    buf.put_u16_le(OP_DMX);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u8(sequence);
    buf.put_u8(0); // physical
    buf.put_u16_le(universe);
    buf.put_u16(wire_len as u16);
    buf.put_slice(&data[..len]);
    if wire_len > len {
        buf.put_u8(0);
    }
    buf.to_vec()
}

/// Encode an ArtPoll frame.
pub fn build_poll() -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(POLL_MIN);
    buf.put_slice(&ARTNET_ID);
    buf.put_u16_le(OP_POLL);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u8(0); // flags
    buf.put_u8(0); // diag priority
    buf.to_vec()
}

/// Encode an ArtPollReply advertising up to four output universes. Net and
/// subnet switches come from the first universe; names are truncated and
/// NUL-padded to their fixed fields.
pub fn build_poll_reply(
    ip: [u8; 4],
    mac: [u8; 6],
    short_name: &str,
    long_name: &str,
    universes: &[Universe],
) -> Vec<u8> {
    let mut buf = vec![0u8; POLL_REPLY_SIZE];

    buf[0..8].copy_from_slice(&ARTNET_ID);
    buf[8..10].copy_from_slice(&OP_POLL_REPLY.to_le_bytes());
    buf[10..14].copy_from_slice(&ip);
    buf[14..16].copy_from_slice(&PORT.to_le_bytes());
    buf[16..18].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());

    if let Some(first) = universes.first() {
        buf[18] = first.net();
        buf[19] = first.subnet();
    }

    write_name(&mut buf[26..44], short_name);
    write_name(&mut buf[44..108], long_name);

    let ports = universes.len().min(4);
    buf[173] = ports as u8;
    for (i, u) in universes.iter().take(4).enumerate() {
        buf[174 + i] = 0xC0; // output port, can output DMX
        buf[182 + i] = 0x80; // data transmitted
        buf[190 + i] = u.index();
    }

    buf[200] = 0x00; // style: StNode
    buf[201..207].copy_from_slice(&mac);

    buf
}

fn write_name(field: &mut [u8], name: &str) {
    let bytes = name.as_bytes();
    let len = bytes.len().min(field.len() - 1);
    field[..len].copy_from_slice(&bytes[..len]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::Universe;

    #[test]
    fn dmx_round_trip() {
        let mut data = [0u8; 512];
        for (i, b) in data.iter_mut().enumerate() {
            *b = i as u8;
        }

        let wire = build_dmx(0x0102, 7, &data);
        assert_eq!(wire.len(), 18 + 512);

        match parse_packet(&wire).unwrap() {
            ArtPacket::Dmx(pkt) => {
                assert_eq!(pkt.version, PROTOCOL_VERSION);
                assert_eq!(pkt.sequence, 7);
                assert_eq!(pkt.universe, 0x0102);
                assert_eq!(pkt.length, 512);
                assert_eq!(pkt.data[..], data[..]);
            }
            other => panic!("expected Dmx, got {:?}", other),
        }
    }

    #[test]
    fn dmx_pads_odd_lengths() {
        let wire = build_dmx(0, 1, &[1, 2, 3]);
        assert_eq!(wire.len(), 18 + 4);
        assert_eq!(u16::from_be_bytes([wire[16], wire[17]]), 4);
        assert_eq!(&wire[18..], &[1, 2, 3, 0]);
    }

    #[test]
    fn dmx_clamps_oversized_data() {
        let big = [0xABu8; 600];
        let wire = build_dmx(0, 1, &big);
        assert_eq!(wire.len(), 18 + 512);
    }

    #[test]
    fn dmx_header_fields_are_wire_exact() {
        let wire = build_dmx(0x1234, 9, &[0; 2]);
        assert_eq!(&wire[0..8], b"Art-Net\0");
        // Opcode and universe little-endian, version and length big-endian.
        assert_eq!(&wire[8..10], &[0x00, 0x50]);
        assert_eq!(&wire[10..12], &[0x00, 0x0E]);
        assert_eq!(wire[12], 9);
        assert_eq!(wire[13], 0);
        assert_eq!(&wire[14..16], &[0x34, 0x12]);
        assert_eq!(&wire[16..18], &[0x00, 0x02]);
    }

    #[test]
    fn truncated_dmx_is_an_error() {
        let mut wire = build_dmx(0, 1, &[0u8; 100]);
        wire.truncate(60);
        assert!(matches!(
            parse_packet(&wire),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn short_and_foreign_packets() {
        assert!(matches!(
            parse_packet(&[0u8; 4]),
            Err(ProtocolError::TooShort { .. })
        ));
        assert!(matches!(
            parse_packet(b"Not-Art\0\x00\x50"),
            Err(ProtocolError::InvalidIdentifier)
        ));

        let mut unknown = Vec::from(ARTNET_ID);
        unknown.extend_from_slice(&0x9999u16.to_le_bytes());
        assert!(matches!(
            parse_packet(&unknown).unwrap(),
            ArtPacket::Unknown(0x9999)
        ));
    }

    #[test]
    fn poll_round_trip() {
        let wire = build_poll();
        assert_eq!(wire.len(), 14);
        match parse_packet(&wire).unwrap() {
            ArtPacket::Poll(pkt) => {
                assert_eq!(pkt.version, PROTOCOL_VERSION);
                assert_eq!(pkt.flags, 0);
            }
            other => panic!("expected Poll, got {:?}", other),
        }
    }

    #[test]
    fn poll_reply_round_trip() {
        let universes = [
            Universe::from_art_parts(1, 2, 0),
            Universe::from_art_parts(1, 2, 1),
            Universe::from_art_parts(1, 2, 2),
        ];
        let mac = [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01];
        let wire = build_poll_reply([10, 0, 0, 9], mac, "proxy", "dmxmap proxy node", &universes);
        assert_eq!(wire.len(), POLL_REPLY_SIZE);

        match parse_packet(&wire).unwrap() {
            ArtPacket::PollReply(pkt) => {
                assert_eq!(pkt.ip, [10, 0, 0, 9]);
                assert_eq!(pkt.port, PORT);
                assert_eq!(pkt.version, PROTOCOL_VERSION);
                assert_eq!(pkt.short_name(), "proxy");
                assert_eq!(pkt.long_name(), "dmxmap proxy node");
                assert_eq!(pkt.num_ports, 3);
                assert_eq!(pkt.mac, mac);
                assert_eq!(pkt.output_universes(), universes);
            }
            other => panic!("expected PollReply, got {:?}", other),
        }
    }

    #[test]
    fn poll_reply_caps_ports_at_four() {
        let universes: Vec<Universe> =
            (0..6).map(|i| Universe::from_art_parts(0, 0, i)).collect();
        let wire = build_poll_reply([127, 0, 0, 1], [0; 6], "a", "b", &universes);

        match parse_packet(&wire).unwrap() {
            ArtPacket::PollReply(pkt) => {
                assert_eq!(pkt.num_ports, 4);
                assert_eq!(pkt.output_universes(), universes[..4]);
            }
            other => panic!("expected PollReply, got {:?}", other),
        }
    }

    #[test]
    fn poll_reply_truncates_long_names() {
        let long = "x".repeat(200);
        let wire = build_poll_reply([0; 4], [0; 6], &long, &long, &[]);
        match parse_packet(&wire).unwrap() {
            ArtPacket::PollReply(pkt) => {
                assert_eq!(pkt.short_name().len(), 17);
                assert_eq!(pkt.long_name().len(), 63);
            }
            other => panic!("expected PollReply, got {:?}", other),
        }
    }

    #[test]
    fn non_dmx_ports_are_skipped() {
        let mut wire = build_poll_reply(
            [0; 4],
            [0; 6],
            "n",
            "n",
            &[Universe::artnet(0), Universe::artnet(1)],
        );
        wire[175] = 0x00; // second port: not DMX-capable
        match parse_packet(&wire).unwrap() {
            ArtPacket::PollReply(pkt) => {
                assert_eq!(pkt.output_universes(), vec![Universe::artnet(0)]);
            }
            other => panic!("expected PollReply, got {:?}", other),
        }
    }
}
