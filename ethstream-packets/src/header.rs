use crate::*;
use std::net::Ipv4Addr;

/// Ethernet + IPv4 (no options) + UDP header length.
pub const UDP_FRAME_HEADER_LEN: usize = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + UDP_HEADER_LEN;

/// Largest UDP payload an IPv4 datagram without options can carry. The IPv4 total length is
/// the tighter of the two 16 bit length fields.
pub const UDP_MAX_PAYLOAD_LEN: usize = 0xFFFF - IPV4_HEADER_LEN - UDP_HEADER_LEN;

/// Every Ethernet, IPv4 and UDP header field of an outgoing datagram, plus the length of the
/// payload it belongs to.
///
/// The sender fills in addresses, ports and the IP fields it cares about. Lengths and
/// checksums are computed by the egress pipeline once the whole payload has been seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRecord {
    pub eth_dest_mac: MacAddr,
    pub eth_src_mac: MacAddr,
    pub eth_type: u16,
    pub ip_dscp: u8,
    pub ip_ecn: u8,
    pub ip_length: u16,
    pub ip_identification: u16,
    pub ip_flags: u8,
    pub ip_fragment_offset: u16,
    pub ip_ttl: u8,
    pub ip_protocol: u8,
    pub ip_header_checksum: u16,
    pub ip_source_ip: Ipv4Addr,
    pub ip_dest_ip: Ipv4Addr,
    pub udp_source_port: u16,
    pub udp_dest_port: u16,
    pub udp_length: u16,
    pub udp_checksum: u16,
    pub payload_len: usize,
}

impl Default for HeaderRecord {
    fn default() -> Self {
        HeaderRecord {
            eth_dest_mac: MacAddr::default(),
            eth_src_mac: MacAddr::default(),
            eth_type: IPV4_ETHER_TYPE,
            ip_dscp: 0,
            ip_ecn: 0,
            ip_length: 0,
            ip_identification: 0,
            // Don't Fragment
            ip_flags: 0b010,
            ip_fragment_offset: 0,
            ip_ttl: 64,
            ip_protocol: u8::from(IpProtocol::UDP),
            ip_header_checksum: 0,
            ip_source_ip: Ipv4Addr::UNSPECIFIED,
            ip_dest_ip: Ipv4Addr::UNSPECIFIED,
            udp_source_port: 0,
            udp_dest_port: 0,
            udp_length: 0,
            udp_checksum: 0,
            payload_len: 0,
        }
    }
}

impl HeaderRecord {
    pub fn udp(
        eth_src_mac: MacAddr,
        ip_source_ip: Ipv4Addr,
        udp_source_port: u16,
        ip_dest_ip: Ipv4Addr,
        udp_dest_port: u16,
    ) -> Self {
        HeaderRecord {
            eth_src_mac,
            ip_source_ip,
            udp_source_port,
            ip_dest_ip,
            udp_dest_port,
            ..HeaderRecord::default()
        }
    }

    /// Sets both length fields for a payload of `payload_len` bytes.
    ///
    /// Panics if the payload is longer than `UDP_MAX_PAYLOAD_LEN`, since the IPv4 total length
    /// would wrap.
    pub fn set_payload_len(&mut self, payload_len: usize) {
        assert!(
            payload_len <= UDP_MAX_PAYLOAD_LEN,
            "UDP payload of {} bytes exceeds {}",
            payload_len,
            UDP_MAX_PAYLOAD_LEN
        );
        self.payload_len = payload_len;
        self.udp_length = (UDP_HEADER_LEN + payload_len) as u16;
        self.ip_length = (IPV4_HEADER_LEN + UDP_HEADER_LEN + payload_len) as u16;
    }

    fn ip_header_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut h = [0u8; IPV4_HEADER_LEN];
        h[0] = 0x45;
        h[1] = (self.ip_dscp << 2) | (self.ip_ecn & 0x03);
        h[2..4].copy_from_slice(&self.ip_length.to_be_bytes());
        h[4..6].copy_from_slice(&self.ip_identification.to_be_bytes());
        let flags_frag = (u16::from(self.ip_flags & 0x07) << 13) | (self.ip_fragment_offset & 0x1FFF);
        h[6..8].copy_from_slice(&flags_frag.to_be_bytes());
        h[8] = self.ip_ttl;
        h[9] = self.ip_protocol;
        h[10..12].copy_from_slice(&self.ip_header_checksum.to_be_bytes());
        h[12..16].copy_from_slice(&self.ip_source_ip.octets());
        h[16..20].copy_from_slice(&self.ip_dest_ip.octets());
        h
    }

    /// IPv4 header checksum over the current field values, ignoring the stored checksum.
    pub fn compute_ip_header_checksum(&self) -> u16 {
        let mut header = *self;
        header.ip_header_checksum = 0;
        internet_checksum(&header.ip_header_bytes())
    }

    /// Encodes the Ethernet, IPv4 and UDP headers in wire order.
    pub fn to_bytes(&self) -> [u8; UDP_FRAME_HEADER_LEN] {
        let mut out = [0u8; UDP_FRAME_HEADER_LEN];
        out[0..6].copy_from_slice(&self.eth_dest_mac.bytes);
        out[6..12].copy_from_slice(&self.eth_src_mac.bytes);
        out[12..14].copy_from_slice(&self.eth_type.to_be_bytes());

        let ip = ETHERNET_HEADER_LEN;
        out[ip..ip + IPV4_HEADER_LEN].copy_from_slice(&self.ip_header_bytes());

        let udp = ip + IPV4_HEADER_LEN;
        out[udp..udp + 2].copy_from_slice(&self.udp_source_port.to_be_bytes());
        out[udp + 2..udp + 4].copy_from_slice(&self.udp_dest_port.to_be_bytes());
        out[udp + 4..udp + 6].copy_from_slice(&self.udp_length.to_be_bytes());
        out[udp + 6..udp + 8].copy_from_slice(&self.udp_checksum.to_be_bytes());
        out
    }
}
