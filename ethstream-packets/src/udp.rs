use crate::*;
use std::borrow::Cow;
use std::convert::TryFrom;

pub const UDP_HEADER_LEN: usize = 8;

/// Read view of a UDP datagram carried by an IPv4 packet.
#[derive(Clone, Debug)]
pub struct UdpSegment {
    pub data: PacketData,
    pub layer3_offset: usize,
    pub layer4_offset: usize,
    pub payload_offset: usize,
}

impl Packet for UdpSegment {}

impl UdpSegment {
    pub fn src_port(&self) -> u16 {
        be16_at(&self.data, self.layer4_offset)
    }

    pub fn dest_port(&self) -> u16 {
        be16_at(&self.data, self.layer4_offset + 2)
    }

    pub fn length(&self) -> u16 {
        be16_at(&self.data, self.layer4_offset + 4)
    }

    pub fn checksum(&self) -> u16 {
        be16_at(&self.data, self.layer4_offset + 6)
    }

    pub fn payload(&self) -> Cow<[u8]> {
        let end = self.layer4_offset + self.length() as usize;
        Cow::from(&self.data[self.payload_offset..end])
    }

    /// Checks the datagram against the pseudo-header of the enclosing IPv4 packet. A zero
    /// checksum means the sender did not compute one and is accepted.
    pub fn validate_checksum(&self) -> bool {
        if self.checksum() == 0 {
            return true;
        }
        let mut acc = ChecksumAccumulator::new();
        acc.add_ipv4(ipv4_at(&self.data, self.layer3_offset + 12));
        acc.add_ipv4(ipv4_at(&self.data, self.layer3_offset + 16));
        acc.add_u16(u16::from(u8::from(IpProtocol::UDP)));
        acc.add_u16(self.length());
        acc.add_bytes(&self.data[self.layer4_offset..self.layer4_offset + self.length() as usize]);
        acc.fold() == 0xFFFF
    }
}

impl TryFrom<Ipv4Packet> for UdpSegment {
    type Error = PacketError;

    fn try_from(packet: Ipv4Packet) -> Result<Self, Self::Error> {
        let protocol = packet.protocol();
        if protocol != IpProtocol::UDP {
            return Err(PacketError::NotUdp(u8::from(protocol)));
        }

        let ip_end = packet.layer3_offset + packet.total_len() as usize;
        let layer4_offset = packet.payload_offset;
        if ip_end < layer4_offset + UDP_HEADER_LEN {
            return Err(PacketError::TooShort {
                what: "UDP header",
                len: ip_end.saturating_sub(layer4_offset),
                needed: UDP_HEADER_LEN,
            });
        }

        let segment = UdpSegment {
            layer3_offset: packet.layer3_offset,
            layer4_offset,
            payload_offset: layer4_offset + UDP_HEADER_LEN,
            data: packet.data,
        };

        let length = segment.length() as usize;
        if length < UDP_HEADER_LEN || layer4_offset + length > ip_end {
            return Err(PacketError::Length {
                field: length,
                actual: ip_end - layer4_offset,
            });
        }
        Ok(segment)
    }
}

/// UdpSegments are considered the same if they have the same data from the layer 4
/// header and onward.
impl PartialEq for UdpSegment {
    fn eq(&self, other: &Self) -> bool {
        self.data[self.layer4_offset..] == other.data[other.layer4_offset..]
    }
}

impl Eq for UdpSegment {}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(ip_and_udp: &[u8]) -> EthernetFrame {
        let mut frame = EthernetFrame::empty();
        frame.set_ether_type(IPV4_ETHER_TYPE);
        frame.set_payload(ip_and_udp);
        frame
    }

    #[test]
    fn udp_segment() {
        let mut data: Vec<u8> = vec![
            0x45, 0, 0, 39, 0, 0, 0, 0, 64, 17, 0, 0, 192, 178, 128, 0, 10, 0, 0, 1,
        ];
        data.extend(&[0, 99, 0, 88, 0, 19, 0xDE, 0xAD, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);

        let packet = Ipv4Packet::try_from(frame_with(&data)).unwrap();
        let segment = UdpSegment::try_from(packet).unwrap();

        assert_eq!(segment.src_port(), 99);
        assert_eq!(segment.dest_port(), 88);
        assert_eq!(segment.length(), 19);
        assert_eq!(segment.checksum(), 0xDEAD);
        assert_eq!(segment.payload().len(), 11);
        assert_eq!(segment.payload()[0], 0);
        assert!(!segment.validate_checksum());
    }

    #[test]
    fn checksum_of_worked_example() {
        let mut data: Vec<u8> = vec![
            0x45, 0, 0, 32, 0, 0, 0x40, 0, 64, 17, 0, 0, 192, 168, 1, 128, 192, 168, 1, 100,
        ];
        data.extend(&[0x04, 0xd2, 0x16, 0x2e, 0x00, 0x0c, 0x5c, 0x9b, 1, 2, 3, 4]);

        let packet = Ipv4Packet::try_from(frame_with(&data)).unwrap();
        let segment = UdpSegment::try_from(packet).unwrap();
        assert!(segment.validate_checksum());
    }

    #[test]
    fn rejects_non_udp_and_bad_length() {
        let data: Vec<u8> = vec![
            0x45, 0, 0, 28, 0, 0, 0, 0, 64, 6, 0, 0, 10, 0, 0, 2, 10, 0, 0, 1, 0, 1, 0, 2, 0, 8,
            0, 0,
        ];
        let packet = Ipv4Packet::try_from(frame_with(&data)).unwrap();
        assert_eq!(
            UdpSegment::try_from(packet).unwrap_err(),
            PacketError::NotUdp(6)
        );

        let data: Vec<u8> = vec![
            0x45, 0, 0, 28, 0, 0, 0, 0, 64, 17, 0, 0, 10, 0, 0, 2, 10, 0, 0, 1, 0, 1, 0, 2, 0, 30,
            0, 0,
        ];
        let packet = Ipv4Packet::try_from(frame_with(&data)).unwrap();
        assert!(UdpSegment::try_from(packet).is_err());
    }
}
