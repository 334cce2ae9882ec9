//! Stage parameters. Every struct deserializes from JSON with missing fields taking their
//! defaults, and every struct has a `validate` that the matching stage constructor runs.
//! Time values are scheduler ticks.

use crate::error::{ConfigError, Result};
use crate::word::MAX_WIDTH;
use ethstream_packets::MacAddr;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub input_width: usize,
    pub output_width: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            input_width: 1,
            output_width: 8,
        }
    }
}

impl AdapterConfig {
    pub fn new(input_width: usize, output_width: usize) -> Self {
        AdapterConfig {
            input_width,
            output_width,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for &width in &[self.input_width, self.output_width] {
            if width == 0 || width > MAX_WIDTH {
                return Err(ConfigError::WidthOutOfRange(width));
            }
        }
        let (wide, narrow) = if self.input_width > self.output_width {
            (self.input_width, self.output_width)
        } else {
            (self.output_width, self.input_width)
        };
        if wide % narrow != 0 {
            return Err(ConfigError::WidthMismatch {
                input: self.input_width,
                output: self.output_width,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub ports: usize,
    /// Rewrite each output word's `id` to the index of the port it came from.
    pub update_id: bool,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        ArbiterConfig {
            ports: 2,
            update_id: false,
        }
    }
}

impl ArbiterConfig {
    pub fn new(ports: usize) -> Self {
        ArbiterConfig {
            ports,
            ..ArbiterConfig::default()
        }
    }

    pub fn update_id(self, update_id: bool) -> Self {
        ArbiterConfig { update_id, ..self }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.ports == 0 {
            return Err(ConfigError::NoPorts);
        }
        if self.update_id && self.ports > usize::from(u8::MAX) + 1 {
            return Err(ConfigError::TooManyTaggedPorts(self.ports));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpConfig {
    pub local_mac: MacAddr,
    pub local_ip: Ipv4Addr,
    pub gateway_ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    /// The cache holds `2^cache_addr_bits` entries.
    pub cache_addr_bits: u32,
    /// Frames that may wait for resolution at once, including the one in flight.
    pub pending_depth: usize,
    /// Number of requests sent before giving up.
    pub retry_count: u32,
    pub retry_interval: u64,
    /// Wait after the final request before the resolution fails.
    pub request_timeout: u64,
    /// Entries older than this are treated as missing. `None` keeps them until overwritten.
    pub entry_lifetime: Option<u64>,
}

impl Default for ArpConfig {
    fn default() -> Self {
        ArpConfig {
            local_mac: MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            local_ip: Ipv4Addr::new(192, 168, 1, 128),
            gateway_ip: Ipv4Addr::new(192, 168, 1, 1),
            subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
            cache_addr_bits: 9,
            pending_depth: 8,
            retry_count: 4,
            retry_interval: 2_000,
            request_timeout: 30_000,
            entry_lifetime: None,
        }
    }
}

impl ArpConfig {
    pub fn local(self, local_mac: MacAddr, local_ip: Ipv4Addr) -> Self {
        ArpConfig {
            local_mac,
            local_ip,
            ..self
        }
    }

    pub fn subnet(self, gateway_ip: Ipv4Addr, subnet_mask: Ipv4Addr) -> Self {
        ArpConfig {
            gateway_ip,
            subnet_mask,
            ..self
        }
    }

    pub fn cache_addr_bits(self, cache_addr_bits: u32) -> Self {
        ArpConfig {
            cache_addr_bits,
            ..self
        }
    }

    pub fn retries(self, retry_count: u32, retry_interval: u64, request_timeout: u64) -> Self {
        ArpConfig {
            retry_count,
            retry_interval,
            request_timeout,
            ..self
        }
    }

    pub fn entry_lifetime(self, entry_lifetime: Option<u64>) -> Self {
        ArpConfig {
            entry_lifetime,
            ..self
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(1..=16).contains(&self.cache_addr_bits) {
            return Err(ConfigError::CacheBits(self.cache_addr_bits));
        }
        if self.pending_depth == 0 {
            return Err(ConfigError::ZeroCapacity {
                what: "ARP pending queue",
            });
        }
        if self.retry_count == 0 {
            return Err(ConfigError::ZeroRetryCount);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpChecksumConfig {
    pub header_depth: usize,
    /// Payload queue depth in words. A frame must fit in it to be sent intact.
    pub payload_depth: usize,
}

impl Default for UdpChecksumConfig {
    fn default() -> Self {
        UdpChecksumConfig {
            header_depth: 8,
            payload_depth: 2048,
        }
    }
}

impl UdpChecksumConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.header_depth == 0 {
            return Err(ConfigError::ZeroCapacity {
                what: "header queue",
            });
        }
        if self.payload_depth < 2 {
            return Err(ConfigError::ZeroCapacity {
                what: "payload queue",
            });
        }
        Ok(())
    }
}

/// Everything `UdpStack` needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub arp: ArpConfig,
    pub udp: UdpChecksumConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Width in bytes of the words leaving the stack.
    pub width: usize,
    /// Tag each output word with the arbiter port it came from.
    pub update_id: bool,
    /// Hold each frame in an egress buffer until its last word and drop it there if it is
    /// flagged bad, so poisoned frames never leave the stack.
    pub drop_bad_frames: bool,
    /// Egress buffer size in output words. Frames longer than this are dropped whole.
    pub egress_depth: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            width: 8,
            update_id: false,
            drop_bad_frames: false,
            egress_depth: 2048,
        }
    }
}

impl StackConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: StackConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        StackConfig::from_json(&json)
    }

    pub fn output_width(self, width: usize) -> Self {
        StackConfig {
            output: OutputConfig {
                width,
                ..self.output
            },
            ..self
        }
    }

    pub fn arp(self, arp: ArpConfig) -> Self {
        StackConfig { arp, ..self }
    }

    pub fn drop_bad_frames(self, egress_depth: usize) -> Self {
        StackConfig {
            output: OutputConfig {
                drop_bad_frames: true,
                egress_depth,
                ..self.output
            },
            ..self
        }
    }

    pub fn adapter(&self) -> AdapterConfig {
        AdapterConfig::new(1, self.output.width)
    }

    pub fn arbiter(&self) -> ArbiterConfig {
        ArbiterConfig::new(2).update_id(self.output.update_id)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.arp.validate()?;
        self.udp.validate()?;
        self.adapter().validate()?;
        if self.output.drop_bad_frames && self.output.egress_depth == 0 {
            return Err(ConfigError::ZeroCapacity {
                what: "egress queue",
            });
        }
        self.arbiter().validate()
    }
}
