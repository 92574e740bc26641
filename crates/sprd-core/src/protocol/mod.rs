//! Protocol module - wire constants and the shared packet value.

pub mod constants;
pub mod packet;

pub use constants::*;
pub use packet::Packet;
