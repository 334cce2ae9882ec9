//! Streaming transmit path for UDP over IPv4 over Ethernet.
//!
//! The protocol stages are synchronous state machines that exchange `StreamWord`s through
//! the `Producer`/`Consumer` handshake in `channel`, and are stepped by a cooperative
//! scheduler (`Stage::tick`). `stack` wires them into a complete transmitter. The `link`
//! layer runs stream stages as tokio tasks instead, with bounded queues between them.

/// The beat that flows between stages: data bytes, a keep mask, end of packet and tags.
pub mod word;

/// The ready/valid handshake and the stage trait every state machine implements.
pub mod channel;

/// Bounded FIFO, optionally holding back whole frames until their last word.
pub mod queue;

/// Bus width conversion.
pub mod adapter;

/// Round robin, packet atomic N to 1 multiplexer.
pub mod arbiter;

/// Address resolution: the direct mapped cache, the request/retry state machine and the
/// frame serializer for outgoing requests and replies.
pub mod arp;

/// UDP checksum and header pipeline, and the assembler that turns headers and payloads into
/// Ethernet frames.
pub mod udp;

/// Reference wiring of the stages into a transmitter.
pub mod stack;

/// Links connect processors and stages into a graph of tokio tasks. A link is built from its
/// input streams and hands back the futures that must be spawned for it to make progress,
/// along with the streams it offers downstream. Links are chained by feeding one link's
/// egress streams to the next link's builder, and the finished graph is handed to the
/// runtime with `utils::runner`.
pub mod link;

/// Per-item transformations loaded into links.
pub mod processor;

pub mod config;
pub mod error;

/// Runners and test helpers.
pub mod utils;

pub use crate::channel::{transfer, Consumer, Producer, Stage, StreamChannel};
pub use crate::config::{
    AdapterConfig, ArbiterConfig, ArpConfig, OutputConfig, StackConfig, UdpChecksumConfig,
};
pub use crate::error::{ConfigError, Error, Result};
pub use crate::stack::{Datagram, UdpStack};
pub use crate::word::{depacketize, frames, packetize, Framed, StreamWord};
