//! Inbound UDP receiver tasks.
//!
//! Each receiver owns one socket and funnels decoded frames into the
//! dispatcher; an alternative capture adapter only needs to call the same
//! dispatcher methods.

pub mod artnet;
pub mod sacn;

pub use artnet::ArtNetReceiver;
pub use sacn::SacnReceiver;
