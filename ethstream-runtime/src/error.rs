use ethstream_packets::PacketError;
use thiserror::Error;

/// Rejected stage parameters. These are construction-time failures; nothing in the pipeline
/// reports a `ConfigError` once it is running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("word width of {0} bytes is outside 1..=64")]
    WidthOutOfRange(usize),
    #[error("widths {input} and {output} are not whole multiples of each other")]
    WidthMismatch { input: usize, output: usize },
    #[error("{what} capacity must be non-zero")]
    ZeroCapacity { what: &'static str },
    #[error("arbiter needs at least one port")]
    NoPorts,
    #[error("{0} arbiter ports cannot be tagged in an 8 bit id")]
    TooManyTaggedPorts(usize),
    #[error("ARP cache address bits {0} outside 1..=16")]
    CacheBits(u32),
    #[error("ARP retry count must be non-zero")]
    ZeroRetryCount,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),
    #[error("could not parse configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
