//! Universe and channel addressing.
//!
//! A [`Universe`] identifies a 512-channel DMX group under one of the two
//! carrier protocols. The canonical text form is `<proto>:<body>`, where the
//! body is a decimal universe number or, for Art-Net only, the dotted
//! `net.subnet.universe` form. [`FromAddress`] and [`ToAddress`] extend a
//! universe with a channel range (source) or start channel (destination).
//!
//! Every parser here round-trips: `parse(x.to_string()) == x` for any value
//! it produces, and none of them panic on arbitrary input.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::AddressError;

/// Highest Art-Net port address: 7-bit net, 4-bit subnet, 4-bit universe.
pub const ARTNET_MAX_UNIVERSE: u16 = 0x7FFF;

/// sACN universe numbers are 1-63999 per E1.31.
pub const SACN_MIN_UNIVERSE: u16 = 1;
pub const SACN_MAX_UNIVERSE: u16 = 63999;

/// Channels are 1-512 in operator-facing addresses.
pub const CHANNELS_PER_UNIVERSE: u16 = 512;

/// Carrier protocol for a universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    ArtNet,
    Sacn,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::ArtNet => f.write_str("artnet"),
            Protocol::Sacn => f.write_str("sacn"),
        }
    }
}

/// A protocol-qualified universe number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Universe {
    pub protocol: Protocol,
    pub number: u16,
}

impl Universe {
    /// Create a universe, enforcing the protocol's number range.
    pub fn new(protocol: Protocol, number: i64) -> Result<Self, AddressError> {
        let in_range = match protocol {
            Protocol::ArtNet => (0..=i64::from(ARTNET_MAX_UNIVERSE)).contains(&number),
            Protocol::Sacn => {
                (i64::from(SACN_MIN_UNIVERSE)..=i64::from(SACN_MAX_UNIVERSE)).contains(&number)
            }
        };
        if !in_range {
            return Err(AddressError::UniverseRange { protocol, number });
        }
        Ok(Universe {
            protocol,
            number: number as u16,
        })
    }

    /// Art-Net universe from a raw port address. Masked to 15 bits, so wire
    /// values are always representable.
    pub fn artnet(number: u16) -> Self {
        Universe {
            protocol: Protocol::ArtNet,
            number: number & ARTNET_MAX_UNIVERSE,
        }
    }

    /// sACN universe from a raw wire number. Range is NOT enforced here;
    /// receivers validate against the mapping table instead.
    pub fn sacn(number: u16) -> Self {
        Universe {
            protocol: Protocol::Sacn,
            number,
        }
    }

    /// Art-Net universe from its net/subnet/universe decomposition.
    pub fn from_art_parts(net: u8, subnet: u8, universe: u8) -> Self {
        let number =
            (u16::from(net & 0x7F) << 8) | (u16::from(subnet & 0x0F) << 4) | u16::from(universe & 0x0F);
        Universe {
            protocol: Protocol::ArtNet,
            number,
        }
    }

    /// Art-Net net component (bits 14-8).
    pub fn net(&self) -> u8 {
        ((self.number >> 8) & 0x7F) as u8
    }

    /// Art-Net subnet component (bits 7-4).
    pub fn subnet(&self) -> u8 {
        ((self.number >> 4) & 0x0F) as u8
    }

    /// Art-Net universe component (bits 3-0).
    pub fn index(&self) -> u8 {
        (self.number & 0x0F) as u8
    }
}

impl fmt::Display for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::ArtNet => write!(
                f,
                "artnet:{}.{}.{}",
                self.net(),
                self.subnet(),
                self.index()
            ),
            Protocol::Sacn => write!(f, "sacn:{}", self.number),
        }
    }
}

impl FromStr for Universe {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (proto, body) = s
            .split_once(':')
            .ok_or_else(|| AddressError::Syntax(s.to_string()))?;
        let protocol = match proto {
            "artnet" => Protocol::ArtNet,
            "sacn" => Protocol::Sacn,
            other => return Err(AddressError::UnknownProtocol(other.to_string())),
        };
        parse_universe_number(body, protocol)
    }
}

impl Serialize for Universe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a universe body (`N.S.U` for Art-Net, decimal otherwise) under a
/// known protocol.
pub fn parse_universe_number(body: &str, protocol: Protocol) -> Result<Universe, AddressError> {
    if protocol == Protocol::ArtNet && body.contains('.') {
        let mut parts = body.splitn(4, '.');
        let net = parse_component(parts.next().unwrap_or(""))?;
        let subnet = parts
            .next()
            .ok_or_else(|| AddressError::Syntax(body.to_string()))
            .and_then(parse_component)?;
        let universe = parts
            .next()
            .ok_or_else(|| AddressError::Syntax(body.to_string()))
            .and_then(parse_component)?;
        if parts.next().is_some() {
            return Err(AddressError::Syntax(body.to_string()));
        }
        return Ok(Universe::from_art_parts(net, subnet, universe));
    }

    let number: i64 = body
        .parse()
        .map_err(|_| AddressError::Syntax(body.to_string()))?;
    Universe::new(protocol, number)
}

/// One `N.S.U` component: decimal, 0-255.
fn parse_component(part: &str) -> Result<u8, AddressError> {
    let value: i64 = part
        .parse()
        .map_err(|_| AddressError::Syntax(part.to_string()))?;
    if !(0..=255).contains(&value) {
        return Err(AddressError::ComponentRange(value));
    }
    Ok(value as u8)
}

/// A source endpoint: universe plus an inclusive 1-based channel range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FromAddress {
    pub universe: Universe,
    pub channel_start: u16,
    pub channel_end: u16,
}

impl FromAddress {
    /// The whole universe, channels 1-512.
    pub fn full(universe: Universe) -> Self {
        FromAddress {
            universe,
            channel_start: 1,
            channel_end: CHANNELS_PER_UNIVERSE,
        }
    }

    /// Number of channels covered.
    pub fn span(&self) -> u16 {
        self.channel_end - self.channel_start + 1
    }
}

impl fmt::Display for FromAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.channel_start == 1 && self.channel_end == CHANNELS_PER_UNIVERSE {
            write!(f, "{}", self.universe)
        } else if self.channel_start == self.channel_end {
            write!(f, "{}:{}", self.universe, self.channel_start)
        } else {
            write!(
                f,
                "{}:{}-{}",
                self.universe, self.channel_start, self.channel_end
            )
        }
    }
}

impl FromStr for FromAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (universe, spec) = split_address(s)?;
        let (channel_start, channel_end) = parse_channel_spec(spec)?;
        Ok(FromAddress {
            universe,
            channel_start,
            channel_end,
        })
    }
}

impl Serialize for FromAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A destination endpoint: universe plus a 1-based start channel. The range
/// length is implied by the paired source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToAddress {
    pub universe: Universe,
    pub channel_start: u16,
}

impl ToAddress {
    /// The whole universe, starting at channel 1.
    pub fn start(universe: Universe) -> Self {
        ToAddress {
            universe,
            channel_start: 1,
        }
    }
}

impl fmt::Display for ToAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.channel_start == 1 {
            write!(f, "{}", self.universe)
        } else {
            write!(f, "{}:{}", self.universe, self.channel_start)
        }
    }
}

impl FromStr for ToAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (universe, spec) = split_address(s)?;
        if spec.contains('-') {
            return Err(AddressError::RangeNotAllowed(s.to_string()));
        }
        let (channel_start, _) = parse_channel_spec(spec)?;
        Ok(ToAddress {
            universe,
            channel_start,
        })
    }
}

impl Serialize for ToAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Split `<universe>[:<spec>]` at the LAST colon, so dotted Art-Net bodies
/// keep their own colon: `artnet:0.0.1:50-100` -> (`artnet:0.0.1`, `50-100`).
/// A string that already parses whole as a universe has an empty spec.
fn split_address(s: &str) -> Result<(Universe, &str), AddressError> {
    if let Ok(universe) = s.parse::<Universe>() {
        return Ok((universe, ""));
    }
    let (head, spec) = s
        .rsplit_once(':')
        .ok_or_else(|| AddressError::Syntax(s.to_string()))?;
    let universe = head.parse::<Universe>()?;
    Ok((universe, spec))
}

/// Channel spec grammar: empty => 1-512, `N` => N-N, `A-B` => A-B,
/// `A-` => A-512.
fn parse_channel_spec(spec: &str) -> Result<(u16, u16), AddressError> {
    if spec.is_empty() {
        return Ok((1, CHANNELS_PER_UNIVERSE));
    }

    let (start, end) = match spec.split_once('-') {
        None => {
            let n = parse_channel(spec)?;
            (n, n)
        }
        Some((a, "")) => (parse_channel(a)?, CHANNELS_PER_UNIVERSE),
        Some((a, b)) => (parse_channel(a)?, parse_channel(b)?),
    };

    if start > end {
        return Err(AddressError::ChannelOrder { start, end });
    }
    Ok((start, end))
}

fn parse_channel(s: &str) -> Result<u16, AddressError> {
    let value: i64 = s
        .parse()
        .map_err(|_| AddressError::Syntax(s.to_string()))?;
    if !(1..=i64::from(CHANNELS_PER_UNIVERSE)).contains(&value) {
        return Err(AddressError::ChannelRange(value));
    }
    Ok(value as u16)
}
