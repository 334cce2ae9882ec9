use ethstream_packets::MacAddr;
use std::net::Ipv4Addr;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
    pub valid: bool,
    /// Tick the binding was last learned.
    pub learned_at: u64,
}

impl ArpEntry {
    const EMPTY: ArpEntry = ArpEntry {
        ip: Ipv4Addr::UNSPECIFIED,
        mac: MacAddr { bytes: [0; 6] },
        valid: false,
        learned_at: 0,
    };
}

/// Direct-mapped IPv4 to MAC cache with `2^addr_bits` slots. The slot of an address is the
/// CRC-32 of its octets masked to the slot count, so two addresses may share a slot and a new
/// binding always replaces whatever held its slot.
pub struct ArpCache {
    slots: Vec<ArpEntry>,
    lifetime: Option<u64>,
}

impl ArpCache {
    pub fn new(addr_bits: u32, lifetime: Option<u64>) -> Self {
        assert!(
            (1..=16).contains(&addr_bits),
            "ArpCache address bits {} must be in range 1..=16",
            addr_bits
        );
        ArpCache {
            slots: vec![ArpEntry::EMPTY; 1 << addr_bits],
            lifetime,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, ip: Ipv4Addr) -> usize {
        crc32fast::hash(&ip.octets()) as usize & (self.slots.len() - 1)
    }

    fn expired(&self, entry: &ArpEntry, now: u64) -> bool {
        match self.lifetime {
            Some(lifetime) => now.saturating_sub(entry.learned_at) >= lifetime,
            None => false,
        }
    }

    pub fn lookup(&self, ip: Ipv4Addr, now: u64) -> Option<MacAddr> {
        let entry = &self.slots[self.slot(ip)];
        if entry.valid && entry.ip == ip && !self.expired(entry, now) {
            Some(entry.mac)
        } else {
            None
        }
    }

    /// Stores a binding, returning the live entry for a different address it evicted.
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr, now: u64) -> Option<ArpEntry> {
        let slot = self.slot(ip);
        let previous = self.slots[slot];
        self.slots[slot] = ArpEntry {
            ip,
            mac,
            valid: true,
            learned_at: now,
        };

        if previous.valid && previous.ip != ip && !self.expired(&previous, now) {
            debug!(slot, %ip, evicted = %previous.ip, "ARP cache eviction");
            Some(previous)
        } else {
            None
        }
    }

    /// Valid, unexpired entries.
    pub fn len(&self, now: u64) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.valid && !self.expired(entry, now))
            .count()
    }

    pub fn clear(&mut self) {
        for entry in self.slots.iter_mut() {
            entry.valid = false;
        }
    }
}
