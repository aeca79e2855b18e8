//! Outbound UDP senders for both carrier protocols.

pub mod artnet;
pub mod sacn;

pub use artnet::ArtNetSender;
pub use sacn::SacnSender;
