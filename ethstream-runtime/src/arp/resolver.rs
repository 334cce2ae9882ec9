use crate::arp::cache::{ArpCache, ArpEntry};
use crate::channel::{Consumer, Producer, Stage};
use crate::config::ArpConfig;
use crate::error::ConfigError;
use crate::queue::BoundedQueue;
use crate::word::Framed;
use ethstream_packets::{ArpFrame, ArpOp, MacAddr, ARP_HARDWARE_ETHERNET, IPV4_ETHER_TYPE};
use std::net::Ipv4Addr;
use tracing::{debug, trace, warn};

/// Outgoing ARP frames waiting for the transmit path.
const TX_DEPTH: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionState {
    Lookup,
    RequestSent,
    Resolved,
    Failed,
}

/// Outcome of one resolution, carrying the frame that waited for it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution<F> {
    Resolved { frame: F, ip: Ipv4Addr, mac: MacAddr },
    Failed { frame: F, ip: Ipv4Addr },
}

impl<F> Resolution<F> {
    pub fn ip(&self) -> Ipv4Addr {
        match self {
            Resolution::Resolved { ip, .. } | Resolution::Failed { ip, .. } => *ip,
        }
    }

    pub fn is_resolved(&self) -> bool {
        match self {
            Resolution::Resolved { .. } => true,
            Resolution::Failed { .. } => false,
        }
    }
}

impl<F> Framed for Resolution<F> {
    fn is_last(&self) -> bool {
        true
    }

    fn is_bad(&self) -> bool {
        false
    }
}

/// A frame queued behind the resolution in flight.
pub struct Pending<F> {
    frame: F,
    ip: Ipv4Addr,
}

impl<F> Framed for Pending<F> {
    fn is_last(&self) -> bool {
        true
    }

    fn is_bad(&self) -> bool {
        false
    }
}

struct InFlight<F> {
    frame: F,
    ip: Ipv4Addr,
    next_hop: Ipv4Addr,
    state: ResolutionState,
    mac: Option<MacAddr>,
    attempts: u32,
    deadline: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArpStats {
    pub requests_sent: u64,
    pub requests_received: u64,
    pub replies_sent: u64,
    pub replies_received: u64,
    pub ignored: u64,
    pub resolved: u64,
    pub failed: u64,
    pub evictions: u64,
}

/// Resolves next-hop hardware addresses for frames of type `F`, and answers ARP requests
/// for the local address.
///
/// Frames enter through `resolve` and leave, in the same order, as `Resolution`s on the
/// `results` queue. One resolution is in flight at a time. Incoming ARP frames are taken
/// through the `Consumer` impl whenever there is room to queue a reply.
pub struct ArpResolver<F> {
    config: ArpConfig,
    cache: ArpCache,
    pending: BoundedQueue<Pending<F>>,
    in_flight: Option<InFlight<F>>,
    results: BoundedQueue<Resolution<F>>,
    tx: BoundedQueue<ArpFrame>,
    now: u64,
    stats: ArpStats,
}

impl<F> ArpResolver<F> {
    pub fn new(config: &ArpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(ArpResolver {
            config: *config,
            cache: ArpCache::new(config.cache_addr_bits, config.entry_lifetime),
            pending: BoundedQueue::new(config.pending_depth),
            in_flight: None,
            results: BoundedQueue::new(config.pending_depth),
            tx: BoundedQueue::new(TX_DEPTH),
            now: 0,
            stats: ArpStats::default(),
        })
    }

    pub fn config(&self) -> &ArpConfig {
        &self.config
    }

    pub fn stats(&self) -> ArpStats {
        self.stats
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn cache(&self) -> &ArpCache {
        &self.cache
    }

    pub fn clear_cache(&mut self) {
        debug!("clearing ARP cache");
        self.cache.clear();
    }

    /// Installs a binding as if it had been learned now.
    pub fn seed(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        self.learn(ip, mac);
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.cache.lookup(ip, self.now)
    }

    /// State of the resolution in flight.
    pub fn state(&self) -> Option<ResolutionState> {
        self.in_flight.as_ref().map(|flight| flight.state)
    }

    pub fn can_resolve(&self) -> bool {
        self.pending.ready()
    }

    /// Queues `frame` until the hardware address for `ip` is known. Hands the frame back
    /// when the pending queue is full.
    pub fn resolve(&mut self, frame: F, ip: Ipv4Addr) -> Result<(), F> {
        self.pending
            .push(Pending { frame, ip })
            .map_err(|pending| pending.frame)
    }

    /// Outgoing ARP requests and replies.
    pub fn tx(&mut self) -> &mut BoundedQueue<ArpFrame> {
        &mut self.tx
    }

    pub fn results(&mut self) -> &mut BoundedQueue<Resolution<F>> {
        &mut self.results
    }

    /// Address to resolve for `ip`, or the answer when no request is needed.
    fn next_hop(&self, ip: Ipv4Addr) -> (Ipv4Addr, Option<MacAddr>) {
        let addr = u32::from(ip);
        let mask = u32::from(self.config.subnet_mask);
        let gateway = u32::from(self.config.gateway_ip);
        if addr | mask == 0xFFFF_FFFF {
            (ip, Some(MacAddr::BROADCAST))
        } else if (addr ^ gateway) & mask == 0 {
            (ip, None)
        } else {
            (self.config.gateway_ip, None)
        }
    }

    fn learn(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        if ip.is_unspecified() {
            return;
        }
        trace!(%ip, %mac, "learned binding");
        if let Some(ArpEntry { ip: evicted, .. }) = self.cache.insert(ip, mac, self.now) {
            debug!(%ip, %evicted, "binding evicted an unrelated entry");
            self.stats.evictions += 1;
        }
    }

    fn send_request(&mut self, target: Ipv4Addr) -> bool {
        let request = ArpFrame::request(self.config.local_mac, self.config.local_ip, target);
        if self.tx.push(request).is_err() {
            return false;
        }
        self.stats.requests_sent += 1;
        true
    }

    fn start_next(&mut self) {
        if let Some(Pending { frame, ip }) = self.pending.pop() {
            let (next_hop, mac) = self.next_hop(ip);
            trace!(%ip, %next_hop, "resolution started");
            self.in_flight = Some(InFlight {
                frame,
                ip,
                next_hop,
                state: ResolutionState::Lookup,
                mac,
                attempts: 0,
                deadline: 0,
            });
        }
    }

    /// Advances the resolution in flight by one step.
    fn step(&mut self) {
        let (state, next_hop, known, attempts, deadline) = match &self.in_flight {
            Some(flight) => (
                flight.state,
                flight.next_hop,
                flight.mac,
                flight.attempts,
                flight.deadline,
            ),
            None => return,
        };

        let found = known.or_else(|| self.cache.lookup(next_hop, self.now));
        let (state, attempts, deadline) = match state {
            ResolutionState::Lookup | ResolutionState::RequestSent if found.is_some() => {
                (ResolutionState::Resolved, attempts, deadline)
            }
            ResolutionState::Lookup => {
                if self.send_request(next_hop) {
                    debug!(%next_hop, "ARP request sent");
                    (
                        ResolutionState::RequestSent,
                        1,
                        self.now + self.wait_after(1),
                    )
                } else {
                    (state, attempts, deadline)
                }
            }
            ResolutionState::RequestSent if self.now >= deadline => {
                if attempts >= self.config.retry_count {
                    (ResolutionState::Failed, attempts, deadline)
                } else if self.send_request(next_hop) {
                    debug!(%next_hop, attempt = attempts + 1, "ARP request retried");
                    (
                        ResolutionState::RequestSent,
                        attempts + 1,
                        self.now + self.wait_after(attempts + 1),
                    )
                } else {
                    (state, attempts, deadline)
                }
            }
            _ => (state, attempts, deadline),
        };

        if let Some(flight) = self.in_flight.as_mut() {
            flight.state = state;
            flight.attempts = attempts;
            flight.deadline = deadline;
            if state == ResolutionState::Resolved {
                flight.mac = found;
            }
        }
    }

    /// Ticks to wait after sending request number `attempt`.
    fn wait_after(&self, attempt: u32) -> u64 {
        if attempt < self.config.retry_count {
            self.config.retry_interval
        } else {
            self.config.request_timeout
        }
    }

    /// Moves a finished resolution onto the results queue.
    fn complete(&mut self) {
        let finished = match &self.in_flight {
            Some(flight) => match flight.state {
                ResolutionState::Resolved | ResolutionState::Failed => true,
                _ => false,
            },
            None => false,
        };
        if !finished || !self.results.ready() {
            return;
        }
        let flight = match self.in_flight.take() {
            Some(flight) => flight,
            None => return,
        };

        let result = match flight.mac {
            Some(mac) if flight.state == ResolutionState::Resolved => {
                self.stats.resolved += 1;
                trace!(ip = %flight.ip, %mac, "resolved");
                Resolution::Resolved {
                    frame: flight.frame,
                    ip: flight.ip,
                    mac,
                }
            }
            _ => {
                self.stats.failed += 1;
                warn!(
                    ip = %flight.ip,
                    next_hop = %flight.next_hop,
                    attempts = flight.attempts,
                    "ARP resolution failed"
                );
                Resolution::Failed {
                    frame: flight.frame,
                    ip: flight.ip,
                }
            }
        };
        if self.results.push(result).is_err() {
            unreachable!("results queue was checked for room");
        }
    }

    fn handle(&mut self, frame: ArpFrame) {
        if frame.hardware_type() != ARP_HARDWARE_ETHERNET || frame.protocol_type() != IPV4_ETHER_TYPE
        {
            trace!(
                htype = frame.hardware_type(),
                ptype = frame.protocol_type(),
                "ignoring non Ethernet/IPv4 ARP frame"
            );
            self.stats.ignored += 1;
            return;
        }

        let sender_ip = frame.sender_protocol_addr();
        let sender_mac = frame.sender_hardware_addr();
        match frame.op() {
            Some(ArpOp::Request) => {
                self.stats.requests_received += 1;
                if frame.target_protocol_addr() != self.config.local_ip {
                    self.stats.ignored += 1;
                    return;
                }
                self.learn(sender_ip, sender_mac);
                let reply = ArpFrame::reply(
                    self.config.local_mac,
                    self.config.local_ip,
                    sender_mac,
                    sender_ip,
                );
                if self.tx.push(reply).is_err() {
                    unreachable!("transmit queue was checked for room");
                }
                self.stats.replies_sent += 1;
                debug!(%sender_ip, %sender_mac, "answered ARP request");
            }
            Some(ArpOp::Reply) => {
                self.stats.replies_received += 1;
                self.learn(sender_ip, sender_mac);
                if let Some(flight) = self.in_flight.as_mut() {
                    if flight.state == ResolutionState::RequestSent && flight.next_hop == sender_ip
                    {
                        flight.state = ResolutionState::Resolved;
                        flight.mac = Some(sender_mac);
                    }
                }
            }
            None => {
                trace!(opcode = frame.opcode(), "ignoring ARP opcode");
                self.stats.ignored += 1;
            }
        }
    }
}

/// Incoming ARP frames. Ready while a reply could be queued.
impl<F> Consumer<ArpFrame> for ArpResolver<F> {
    fn ready(&self) -> bool {
        self.tx.ready()
    }

    fn push(&mut self, frame: ArpFrame) -> Result<(), ArpFrame> {
        if !self.tx.ready() {
            return Err(frame);
        }
        self.handle(frame);
        Ok(())
    }
}

impl<F> Stage for ArpResolver<F> {
    fn tick(&mut self) {
        self.now += 1;
        if self.in_flight.is_none() {
            self.start_next();
        }
        self.step();
        self.complete();
    }

    fn busy(&self) -> bool {
        self.in_flight.is_some()
            || !self.pending.is_empty()
            || !self.results.is_empty()
            || !self.tx.is_empty()
    }
}

impl ArpResolver<()> {
    /// Resolver that only answers requests and learns bindings.
    pub fn responder(config: &ArpConfig) -> Result<Self, ConfigError> {
        ArpResolver::new(config)
    }
}
