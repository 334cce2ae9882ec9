//! UDP egress: checksum computation over the streaming payload, then Ethernet framing.

mod assembler;
mod checksum;

pub use self::assembler::*;
pub use self::checksum::*;
