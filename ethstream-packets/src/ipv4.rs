use crate::*;
use std::borrow::Cow;
use std::convert::TryFrom;
use std::net::Ipv4Addr;

pub const IPV4_HEADER_LEN: usize = 20;

/// Read view of an IPv4 packet inside a buffer, used to check frames that come out of the
/// egress pipeline.
#[derive(Clone, Debug)]
pub struct Ipv4Packet {
    pub data: PacketData,
    pub layer3_offset: usize,
    pub payload_offset: usize,
}

impl Packet for Ipv4Packet {}

impl Ipv4Packet {
    /// Checks that a version 4 header starts at `layer3_offset` and that the buffer holds
    /// everything its total length claims. Bytes past the total length, such as Ethernet
    /// padding, are allowed.
    pub fn from_buffer(data: PacketData, layer3_offset: usize) -> Result<Ipv4Packet, PacketError> {
        let available = data.len().saturating_sub(layer3_offset);
        if available < IPV4_HEADER_LEN {
            return Err(PacketError::TooShort {
                what: "IPv4 header",
                len: available,
                needed: IPV4_HEADER_LEN,
            });
        }

        let version = data[layer3_offset] >> 4;
        if version != 4 {
            return Err(PacketError::Version(version));
        }
        let total_len = be16_at(&data, layer3_offset + 2) as usize;
        if available < total_len {
            return Err(PacketError::Length {
                field: total_len,
                actual: available,
            });
        }

        // IHL counts 32 bit words.
        let header_len = usize::from(data[layer3_offset] & 0x0F) * 4;
        Ok(Ipv4Packet {
            payload_offset: layer3_offset + header_len,
            data,
            layer3_offset,
        })
    }

    fn header(&self) -> &[u8] {
        &self.data[self.layer3_offset..self.payload_offset]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        ipv4_at(self.header(), 12)
    }

    pub fn dest_addr(&self) -> Ipv4Addr {
        ipv4_at(self.header(), 16)
    }

    pub fn ihl(&self) -> u8 {
        self.header()[0] & 0x0F
    }

    /// Payload up to the total length field, excluding any Ethernet padding.
    pub fn payload(&self) -> Cow<[u8]> {
        let end = self.layer3_offset + self.total_len() as usize;
        Cow::from(&self.data[self.payload_offset..end])
    }

    pub fn protocol(&self) -> IpProtocol {
        IpProtocol::from(self.header()[9])
    }

    pub fn total_len(&self) -> u16 {
        be16_at(self.header(), 2)
    }

    pub fn ttl(&self) -> u8 {
        self.header()[8]
    }

    pub fn checksum(&self) -> u16 {
        be16_at(self.header(), 10)
    }

    pub fn dscp(&self) -> u8 {
        self.header()[1] >> 2
    }

    pub fn ecn(&self) -> u8 {
        self.header()[1] & 0x03
    }

    pub fn identification(&self) -> u16 {
        be16_at(self.header(), 4)
    }

    pub fn fragment_offset(&self) -> u16 {
        be16_at(self.header(), 6) & 0x1FFF
    }

    /// Don't Fragment and More Fragments, in that order.
    pub fn flags(&self) -> (bool, bool) {
        let flags = self.header()[6] >> 5;
        (flags & 0b010 != 0, flags & 0b001 != 0)
    }

    /// A header with a correct checksum sums to all ones.
    pub fn validate_checksum(&self) -> bool {
        let mut acc = ChecksumAccumulator::new();
        acc.add_bytes(self.header());
        acc.fold() == 0xFFFF
    }

    /// The checksum the header should carry, computed with the checksum field left out.
    pub fn calculate_checksum(&self) -> u16 {
        let header = self.header();
        let mut acc = ChecksumAccumulator::new();
        acc.add_bytes(&header[..10]);
        acc.add_bytes(&header[12..]);
        acc.finish()
    }
}

impl TryFrom<EthernetFrame> for Ipv4Packet {
    type Error = PacketError;

    fn try_from(frame: EthernetFrame) -> Result<Self, Self::Error> {
        if frame.ether_type() != IPV4_ETHER_TYPE {
            return Err(PacketError::EtherType {
                expected: IPV4_ETHER_TYPE,
                found: frame.ether_type(),
            });
        }
        Ipv4Packet::from_buffer(frame.data, frame.payload_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn ethernet_with(ip_data: &[u8]) -> EthernetFrame {
        let mut frame = EthernetFrame::empty();
        frame.set_ether_type(IPV4_ETHER_TYPE);
        frame.set_payload(ip_data);
        frame
    }

    #[test]
    fn ipv4_packet() {
        let ip_data: Vec<u8> = vec![
            0x45, 0, 0, 20, 0, 0, 0, 0, 64, 17, 0, 0, 192, 178, 128, 0, 10, 0, 0, 1,
        ];

        let packet = Ipv4Packet::try_from(ethernet_with(&ip_data)).unwrap();

        assert_eq!(packet.src_addr(), Ipv4Addr::new(192, 178, 128, 0));
        assert_eq!(packet.dest_addr(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(packet.ihl(), 5);
        assert_eq!(packet.payload().len(), 0);
        assert_eq!(packet.protocol(), IpProtocol::UDP);
        assert_eq!(packet.total_len(), 20);
        assert_eq!(packet.ttl(), 64);
        assert_eq!(packet.checksum(), 0);
        assert_eq!(packet.dscp(), 0);
        assert_eq!(packet.ecn(), 0);
        assert_eq!(packet.identification(), 0);
        assert_eq!(packet.fragment_offset(), 0);
        assert_eq!(packet.flags(), (false, false));
    }

    #[test]
    fn validate_checksum() {
        let invalid_checksum_data: Vec<u8> = vec![
            0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0x61, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let packet = Ipv4Packet::try_from(ethernet_with(&invalid_checksum_data)).unwrap();
        assert!(!packet.validate_checksum());
        assert_eq!(packet.calculate_checksum(), 0xb8c0);

        let valid_checksum_data: Vec<u8> = vec![
            0x45, 0x00, 0x00, 0x14, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0xb8, 0xc0, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        let packet = Ipv4Packet::try_from(ethernet_with(&valid_checksum_data)).unwrap();
        assert!(packet.validate_checksum());
        assert_eq!(packet.checksum(), packet.calculate_checksum());
    }

    #[test]
    fn padding_after_total_len_is_ignored() {
        let mut ip_data: Vec<u8> = vec![
            0x45, 0, 0, 22, 0, 0, 0, 0, 64, 17, 0, 0, 10, 0, 0, 2, 10, 0, 0, 1, 0xaa, 0xbb,
        ];
        ip_data.extend(&[0; 10]);
        let packet = Ipv4Packet::try_from(ethernet_with(&ip_data)).unwrap();
        assert_eq!(packet.payload(), vec![0xaa, 0xbb]);
    }

    #[test]
    fn rejects_bad_version_and_truncation() {
        let mut ip_data: Vec<u8> = vec![
            0x65, 0, 0, 20, 0, 0, 0, 0, 64, 17, 0, 0, 10, 0, 0, 2, 10, 0, 0, 1,
        ];
        assert_eq!(
            Ipv4Packet::try_from(ethernet_with(&ip_data)).unwrap_err(),
            PacketError::Version(6)
        );
        ip_data[0] = 0x45;
        ip_data[3] = 40;
        assert!(Ipv4Packet::try_from(ethernet_with(&ip_data)).is_err());
    }
}
