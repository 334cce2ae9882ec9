//! Ones'-complement arithmetic shared by the IPv4 header checksum and the UDP checksum.
//!
//! The accumulator is wider than the 16 bit words it sums, carries are kept until the sum is
//! finalized.

use std::net::Ipv4Addr;

/// Running ones'-complement sum. Carries are folded back only by [`ChecksumAccumulator::fold`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecksumAccumulator {
    sum: u32,
}

impl ChecksumAccumulator {
    pub fn new() -> Self {
        ChecksumAccumulator { sum: 0 }
    }

    pub fn raw(&self) -> u32 {
        self.sum
    }

    pub fn reset(&mut self) {
        self.sum = 0;
    }

    pub fn add_u16(&mut self, word: u16) {
        self.sum = self.sum.wrapping_add(u32::from(word));
    }

    pub fn add_u32(&mut self, value: u32) {
        self.sum = self.sum.wrapping_add(value);
    }

    pub fn add_ipv4(&mut self, addr: Ipv4Addr) {
        let o = addr.octets();
        self.add_u16(u16::from_be_bytes([o[0], o[1]]));
        self.add_u16(u16::from_be_bytes([o[2], o[3]]));
    }

    /// Adds a byte string as big-endian 16 bit words, zero padding an odd trailing byte.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        let mut chunks = bytes.chunks_exact(2);
        for pair in &mut chunks {
            self.add_u16(u16::from_be_bytes([pair[0], pair[1]]));
        }
        if let [last] = chunks.remainder() {
            self.add_u16(u16::from_be_bytes([*last, 0]));
        }
    }

    /// Adds the carry bits back in twice. Two rounds are enough for any 32 bit sum.
    pub fn fold(&self) -> u16 {
        let once = (self.sum & 0xFFFF) + (self.sum >> 16);
        let twice = (once & 0xFFFF) + (once >> 16);
        twice as u16
    }

    /// Complement of the folded sum.
    pub fn finish(&self) -> u16 {
        !self.fold()
    }

    /// Like `finish`, but an all-zero result is sent as all-ones since zero means "no checksum"
    /// in a UDP header.
    pub fn finish_udp(&self) -> u16 {
        match self.finish() {
            0 => 0xFFFF,
            checksum => checksum,
        }
    }
}

/// Internet checksum (RFC 1071) of a byte string.
pub fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut acc = ChecksumAccumulator::new();
    acc.add_bytes(bytes);
    acc.finish()
}

/// UDP checksum over the IPv4 pseudo-header and the whole datagram (header and payload).
/// The checksum field inside `datagram` must be zero or is otherwise included in the sum.
pub fn udp_checksum(src: Ipv4Addr, dest: Ipv4Addr, datagram: &[u8]) -> u16 {
    let mut acc = ChecksumAccumulator::new();
    acc.add_ipv4(src);
    acc.add_ipv4(dest);
    acc.add_u16(17);
    acc.add_u16(datagram.len() as u16);
    acc.add_bytes(datagram);
    acc.finish_udp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1071_example() {
        // Example sum from RFC 1071 section 3
        let bytes = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        let mut acc = ChecksumAccumulator::new();
        acc.add_bytes(&bytes);
        assert_eq!(acc.fold(), 0xddf2);
        assert_eq!(acc.finish(), 0x220d);
    }

    #[test]
    fn odd_length_is_zero_padded() {
        assert_eq!(internet_checksum(&[0x12]), internet_checksum(&[0x12, 0x00]));
    }

    #[test]
    fn carries_survive_until_fold() {
        let mut acc = ChecksumAccumulator::new();
        for _ in 0..0x1_0000 {
            acc.add_u16(0xFFFF);
        }
        assert!(acc.raw() > 0xFFFF);
        assert_eq!(acc.fold(), 0xFFFF);
    }

    #[test]
    fn ipv4_header_checksum() {
        let header = [
            0x45, 0x00, 0x00, 0x20, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 192, 168, 1,
            128, 192, 168, 1, 100,
        ];
        assert_eq!(internet_checksum(&header), 0xb698);
    }

    #[test]
    fn udp_worked_example() {
        let datagram = [0x04, 0xd2, 0x16, 0x2e, 0x00, 0x0c, 0x00, 0x00, 1, 2, 3, 4];
        let checksum = udp_checksum(
            Ipv4Addr::new(192, 168, 1, 128),
            Ipv4Addr::new(192, 168, 1, 100),
            &datagram,
        );
        assert_eq!(checksum, 0x5c9b);
    }

    #[test]
    fn zero_udp_checksum_is_sent_as_ones() {
        let datagram = [0x04, 0xd2, 0x16, 0x2e, 0x00, 0x0a, 0x00, 0x00, 0x60, 0xa5];
        let checksum = udp_checksum(
            Ipv4Addr::new(192, 168, 1, 128),
            Ipv4Addr::new(192, 168, 1, 100),
            &datagram,
        );
        assert_eq!(checksum, 0xFFFF);
    }
}
