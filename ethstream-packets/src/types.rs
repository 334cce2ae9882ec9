use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The common datatype that all packet structures share to represent their data
pub type PacketData = Vec<u8>;

/// Marker for the buffer-backed packet views in this crate.
pub trait Packet {}

/// Big endian 16 bit field starting at `at`.
pub(crate) fn be16_at(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

/// IPv4 address field starting at `at`.
pub(crate) fn ipv4_at(data: &[u8], at: usize) -> std::net::Ipv4Addr {
    std::net::Ipv4Addr::new(data[at], data[at + 1], data[at + 2], data[at + 3])
}

pub const IPV4_ETHER_TYPE: u16 = 0x0800;
pub const ARP_ETHER_TYPE: u16 = 0x0806;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer of {len} bytes is shorter than the {needed} byte {what}")]
    TooShort {
        what: &'static str,
        len: usize,
        needed: usize,
    },
    #[error("frame has ether type {found:#06x}, expected {expected:#06x}")]
    EtherType { expected: u16, found: u16 },
    #[error("packet has IP version {0}, expected 4")]
    Version(u8),
    #[error("length field says {field} bytes but {actual} are present")]
    Length { field: usize, actual: usize },
    #[error("protocol {0} is not UDP")]
    NotUdp(u8),
    #[error("invalid MAC address {0:?}")]
    MacAddr(String),
}

/// Ethernet hardware address. Most significant byte is 0th.
#[derive(Eq, Clone, Copy, Hash, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr {
    pub bytes: [u8; 6],
}

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr { bytes: [0xff; 6] };

    pub fn new(bytes: [u8; 6]) -> MacAddr {
        MacAddr { bytes }
    }

    pub fn is_broadcast(&self) -> bool {
        *self == MacAddr::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}

impl FromStr for MacAddr {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for byte in bytes.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| PacketError::MacAddr(s.to_string()))?;
            *byte =
                u8::from_str_radix(part, 16).map_err(|_| PacketError::MacAddr(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(PacketError::MacAddr(s.to_string()));
        }
        Ok(MacAddr { bytes })
    }
}

impl std::convert::TryFrom<String> for MacAddr {
    type Error = PacketError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> String {
        mac.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    ICMP,
    TCP,
    UDP,
    Unknown(u8),
}

impl From<u8> for IpProtocol {
    fn from(protocol: u8) -> Self {
        match protocol {
            1 => IpProtocol::ICMP,
            6 => IpProtocol::TCP,
            17 => IpProtocol::UDP,
            other => IpProtocol::Unknown(other),
        }
    }
}

impl From<IpProtocol> for u8 {
    fn from(protocol: IpProtocol) -> u8 {
        match protocol {
            IpProtocol::ICMP => 1,
            IpProtocol::TCP => 6,
            IpProtocol::UDP => 17,
            IpProtocol::Unknown(other) => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_display_and_parse() {
        let mac = MacAddr::new([0x02, 0x00, 0x00, 0xab, 0xcd, 0xef]);
        assert_eq!(mac.to_string(), "02:00:00:ab:cd:ef");
        assert_eq!("02:00:00:ab:cd:ef".parse::<MacAddr>(), Ok(mac));
        assert_eq!("02-00-00-AB-CD-EF".parse::<MacAddr>(), Ok(mac));
    }

    #[test]
    fn mac_parse_rejects_garbage() {
        assert!("02:00:00".parse::<MacAddr>().is_err());
        assert!("02:00:00:00:00:00:00".parse::<MacAddr>().is_err());
        assert!("zz:00:00:00:00:00".parse::<MacAddr>().is_err());
    }

    #[test]
    fn broadcast() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(!MacAddr::default().is_broadcast());
    }

    #[test]
    fn ip_protocol_round_trips_through_u8() {
        assert_eq!(IpProtocol::from(17), IpProtocol::UDP);
        assert_eq!(u8::from(IpProtocol::UDP), 17);
        assert_eq!(u8::from(IpProtocol::from(99)), 99);
    }
}
