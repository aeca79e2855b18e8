//! Error types for the dmxmap wire protocols.

use thiserror::Error;

use crate::universe::Protocol;

/// Errors produced while decoding a wire packet.
///
/// Receivers treat every variant the same way: the datagram is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Datagram is shorter than the fixed header for its packet type.
    #[error("packet too short: got {actual} bytes, need {expected}")]
    TooShort { expected: usize, actual: usize },

    /// Packet identifier does not match the protocol magic.
    #[error("invalid packet identifier")]
    InvalidIdentifier,

    /// Header declares more payload than the datagram carries.
    #[error("truncated payload: header declares {declared} bytes, {actual} present")]
    Truncated { declared: usize, actual: usize },
}

/// Errors produced while parsing universe and channel address text.
///
/// Surfaced to the operator at configuration load, so the messages carry the
/// offending input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Input does not match the address grammar.
    #[error("malformed address: {0:?}")]
    Syntax(String),

    /// Protocol prefix is not `artnet` or `sacn`.
    #[error("unknown protocol: {0:?}")]
    UnknownProtocol(String),

    /// Universe number is outside the protocol's allowed interval.
    #[error("universe {number} out of range for {protocol}")]
    UniverseRange { protocol: Protocol, number: i64 },

    /// A net/subnet/universe component exceeds 255.
    #[error("universe component {0} out of range (0-255)")]
    ComponentRange(i64),

    /// Channel number is outside 1-512.
    #[error("channel {0} out of range (1-512)")]
    ChannelRange(i64),

    /// Channel range start exceeds its end.
    #[error("channel range start {start} exceeds end {end}")]
    ChannelOrder { start: u16, end: u16 },

    /// A destination address carried a channel range.
    #[error("destination address must not carry a range: {0:?}")]
    RangeNotAllowed(String),
}
