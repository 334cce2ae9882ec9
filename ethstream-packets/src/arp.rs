use crate::*;
use std::convert::TryFrom;
use std::net::Ipv4Addr;

/// Length of an ARP payload carrying Ethernet hardware and IPv4 protocol addresses.
pub const ARP_PAYLOAD_LEN: usize = 28;

pub const ARP_HARDWARE_ETHERNET: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl TryFrom<u16> for ArpOp {
    type Error = u16;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ArpOp::Request),
            2 => Ok(ArpOp::Reply),
            other => Err(other),
        }
    }
}

// Field offsets into the ARP payload.
const HTYPE: usize = 0;
const PTYPE: usize = 2;
const HLEN: usize = 4;
const PLEN: usize = 5;
const OPER: usize = 6;
const SHA: usize = 8;
const SPA: usize = 14;
const THA: usize = 18;
const TPA: usize = 24;

/// An Ethernet frame carrying an ARP packet as laid out in RFC 826.
///
/// Only the Ethernet/IPv4 flavour is modelled, so the address fields sit at fixed offsets no
/// matter what the length fields claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArpFrame {
    frame: EthernetFrame,
}

impl ArpFrame {
    /// Ethernet/IPv4 type and length fields filled in, opcode and addresses zero.
    pub fn new() -> Self {
        let mut frame = EthernetFrame::empty();
        frame.set_ether_type(ARP_ETHER_TYPE);
        frame.set_payload(&[0; ARP_PAYLOAD_LEN]);

        let mut arp = ArpFrame { frame };
        arp.set_hardware_type(ARP_HARDWARE_ETHERNET);
        arp.set_protocol_type(IPV4_ETHER_TYPE);
        arp.set_hardware_addr_len(6);
        arp.set_protocol_addr_len(4);
        arp
    }

    fn addressed(
        op: ArpOp,
        dest: MacAddr,
        sender: (MacAddr, Ipv4Addr),
        target: (MacAddr, Ipv4Addr),
    ) -> Self {
        let mut arp = ArpFrame::new();
        arp.frame.set_dest_mac(dest);
        arp.frame.set_src_mac(sender.0);
        arp.set_opcode(op as u16);
        arp.put(SHA, &sender.0.bytes);
        arp.put(SPA, &sender.1.octets());
        arp.put(THA, &target.0.bytes);
        arp.put(TPA, &target.1.octets());
        arp
    }

    /// Broadcast "who has `target_ip`, tell `sender_ip`".
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        ArpFrame::addressed(
            ArpOp::Request,
            MacAddr::BROADCAST,
            (sender_mac, sender_ip),
            (MacAddr::default(), target_ip),
        )
    }

    /// Unicast "`sender_ip` is at `sender_mac`" back to the asker.
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        ArpFrame::addressed(
            ArpOp::Reply,
            target_mac,
            (sender_mac, sender_ip),
            (target_mac, target_ip),
        )
    }

    pub fn hardware_type(&self) -> u16 {
        be16_at(self.body(), HTYPE)
    }

    pub fn protocol_type(&self) -> u16 {
        be16_at(self.body(), PTYPE)
    }

    pub fn hardware_addr_len(&self) -> u8 {
        self.body()[HLEN]
    }

    pub fn protocol_addr_len(&self) -> u8 {
        self.body()[PLEN]
    }

    pub fn opcode(&self) -> u16 {
        be16_at(self.body(), OPER)
    }

    /// The opcode, if it is one this crate understands.
    pub fn op(&self) -> Option<ArpOp> {
        ArpOp::try_from(self.opcode()).ok()
    }

    pub fn sender_hardware_addr(&self) -> MacAddr {
        self.mac_at(SHA)
    }

    pub fn sender_protocol_addr(&self) -> Ipv4Addr {
        ipv4_at(self.body(), SPA)
    }

    pub fn target_hardware_addr(&self) -> MacAddr {
        self.mac_at(THA)
    }

    pub fn target_protocol_addr(&self) -> Ipv4Addr {
        ipv4_at(self.body(), TPA)
    }

    pub fn set_hardware_type(&mut self, htype: u16) {
        self.put(HTYPE, &htype.to_be_bytes());
    }

    pub fn set_protocol_type(&mut self, ptype: u16) {
        self.put(PTYPE, &ptype.to_be_bytes());
    }

    pub fn set_hardware_addr_len(&mut self, len: u8) {
        self.put(HLEN, &[len]);
    }

    pub fn set_protocol_addr_len(&mut self, len: u8) {
        self.put(PLEN, &[len]);
    }

    pub fn set_opcode(&mut self, code: u16) {
        self.put(OPER, &code.to_be_bytes());
    }

    pub fn ethernet(&self) -> &EthernetFrame {
        &self.frame
    }

    /// Gives up the ARP view and hands back the frame.
    pub fn frame(self) -> EthernetFrame {
        self.frame
    }

    fn body(&self) -> &[u8] {
        &self.frame.data[self.frame.payload_offset..]
    }

    fn mac_at(&self, at: usize) -> MacAddr {
        let mut bytes = [0; 6];
        bytes.copy_from_slice(&self.body()[at..at + 6]);
        MacAddr::new(bytes)
    }

    fn put(&mut self, at: usize, bytes: &[u8]) {
        let start = self.frame.payload_offset + at;
        self.frame.data[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl Default for ArpFrame {
    fn default() -> Self {
        ArpFrame::new()
    }
}

impl TryFrom<EthernetFrame> for ArpFrame {
    type Error = PacketError;

    /// Accepts frames with the ARP ether type and room for Ethernet/IPv4 addresses. Padding
    /// after the ARP payload is fine.
    fn try_from(frame: EthernetFrame) -> Result<Self, Self::Error> {
        if frame.ether_type() != ARP_ETHER_TYPE {
            return Err(PacketError::EtherType {
                expected: ARP_ETHER_TYPE,
                found: frame.ether_type(),
            });
        };

        let payload_len = frame.payload().len();
        if payload_len < ARP_PAYLOAD_LEN {
            return Err(PacketError::TooShort {
                what: "ARP payload",
                len: payload_len,
                needed: ARP_PAYLOAD_LEN,
            });
        }

        Ok(ArpFrame { frame })
    }
}
