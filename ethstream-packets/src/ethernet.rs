use crate::*;
use std::borrow::Cow;

pub const ETHERNET_HEADER_LEN: usize = 14;

/// Ethernet II frames are padded to this length (not counting the FCS) before they hit the wire.
pub const ETHERNET_MIN_FRAME_LEN: usize = 60;

/// An Ethernet II frame: destination and source MAC, ether type, then the payload. The
/// frame check sequence is not part of the buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthernetFrame {
    pub data: PacketData,
    pub payload_offset: usize,
}

impl Packet for EthernetFrame {}

impl EthernetFrame {
    /// Takes ownership of a frame's bytes. Only the 14 byte header has to be present.
    pub fn from_buffer(data: PacketData) -> Result<EthernetFrame, PacketError> {
        if data.len() < ETHERNET_HEADER_LEN {
            return Err(PacketError::TooShort {
                what: "Ethernet header",
                len: data.len(),
                needed: ETHERNET_HEADER_LEN,
            });
        }
        Ok(EthernetFrame {
            data,
            payload_offset: ETHERNET_HEADER_LEN,
        })
    }

    /// A zeroed header and no payload.
    pub fn empty() -> EthernetFrame {
        EthernetFrame {
            data: vec![0; ETHERNET_HEADER_LEN],
            payload_offset: ETHERNET_HEADER_LEN,
        }
    }

    fn mac_at(&self, at: usize) -> MacAddr {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(&self.data[at..at + 6]);
        MacAddr::new(bytes)
    }

    pub fn dest_mac(&self) -> MacAddr {
        self.mac_at(0)
    }

    pub fn src_mac(&self) -> MacAddr {
        self.mac_at(6)
    }

    pub fn ether_type(&self) -> u16 {
        be16_at(&self.data, 12)
    }

    pub fn set_dest_mac(&mut self, mac: MacAddr) {
        self.data[0..6].copy_from_slice(&mac.bytes);
    }

    pub fn set_src_mac(&mut self, mac: MacAddr) {
        self.data[6..12].copy_from_slice(&mac.bytes);
    }

    pub fn set_ether_type(&mut self, ether_type: u16) {
        self.data[12..14].copy_from_slice(&ether_type.to_be_bytes());
    }

    /// Everything after the header, padding included.
    pub fn payload(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.payload_offset..])
    }

    /// Replaces the payload, keeping the header.
    pub fn set_payload(&mut self, payload: &[u8]) {
        self.data.truncate(self.payload_offset);
        self.data.extend_from_slice(payload);
    }

    /// Zero pads the frame up to the Ethernet minimum.
    pub fn pad(&mut self) {
        if self.data.len() < ETHERNET_MIN_FRAME_LEN {
            self.data.resize(ETHERNET_MIN_FRAME_LEN, 0);
        }
    }

    pub fn into_bytes(self) -> PacketData {
        self.data
    }
}
