use crate::adapter::WidthAdapter;
use crate::arbiter::Arbiter;
use crate::arp::{ArpStats, FrameSerializer};
use crate::channel::{Consumer, Producer, Stage, StreamChannel};
use crate::config::StackConfig;
use crate::error::ConfigError;
use crate::queue::BoundedQueue;
use crate::udp::{FrameAssembler, UdpChecksumPipeline};
use crate::word::{Framed, StreamWord};
use ethstream_packets::{ArpFrame, HeaderRecord, MacAddr};
use std::net::Ipv4Addr;
use tracing::debug;

/// Arbiter input carrying UDP frames.
pub const UDP_PORT: usize = 0;
/// Arbiter input carrying ARP requests and replies.
pub const ARP_PORT: usize = 1;

/// A whole datagram to send: its header fields and its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub header: HeaderRecord,
    pub payload: Vec<u8>,
}

impl Datagram {
    pub fn new(header: HeaderRecord, payload: Vec<u8>) -> Self {
        Datagram { header, payload }
    }
}

/// Each datagram is a frame of its own.
impl Framed for Datagram {
    fn is_last(&self) -> bool {
        true
    }

    fn is_bad(&self) -> bool {
        false
    }
}

struct StackChannels {
    headers: StreamChannel,
    payload: StreamChannel,
    udp_frames: StreamChannel,
    arp_frames: StreamChannel,
    arp_words: StreamChannel,
    merged: StreamChannel,
    egress: StreamChannel,
}

/// A complete UDP/IPv4 transmit path.
///
/// ```text
/// header ──► checksum ──► assembler ──► arbiter[0] ──► adapter ──► [egress] ──► output
/// payload ─┘                 │ARP tx       ▲
///                            └─► serializer┘ arbiter[1]
/// ```
///
/// The egress buffer is only there with `OutputConfig::drop_bad_frames`. It releases a frame
/// once its last word is in and discards frames that carry the user bit.
///
/// Every `tick` drives each edge once, walking the graph from the output back to the inputs,
/// then steps each stage.
pub struct UdpStack {
    config: StackConfig,
    checksum: UdpChecksumPipeline,
    assembler: FrameAssembler,
    serializer: FrameSerializer,
    arbiter: Arbiter,
    adapter: WidthAdapter,
    egress: Option<BoundedQueue<StreamWord>>,
    channels: StackChannels,
    ticks: u64,
}

impl UdpStack {
    pub fn new(config: &StackConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(?config, "building UDP stack");
        Ok(UdpStack {
            config: *config,
            checksum: UdpChecksumPipeline::new(&config.udp)?,
            assembler: FrameAssembler::new(&config.arp)?,
            serializer: FrameSerializer::new(),
            arbiter: Arbiter::new(&config.arbiter())?,
            adapter: WidthAdapter::new(&config.adapter())?,
            egress: if config.output.drop_bad_frames {
                Some(BoundedQueue::frame_mode(config.output.egress_depth))
            } else {
                None
            },
            channels: StackChannels {
                headers: StreamChannel::new("headers"),
                payload: StreamChannel::new("payload"),
                udp_frames: StreamChannel::new("udp frames"),
                arp_frames: StreamChannel::new("arp frames"),
                arp_words: StreamChannel::new("arp words"),
                merged: StreamChannel::new("merged"),
                egress: StreamChannel::new("egress"),
            },
            ticks: 0,
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn header_ready(&self) -> bool {
        self.checksum.header_ready()
    }

    /// Starts a datagram. The source MAC is filled in on the way out.
    pub fn push_header(&mut self, header: HeaderRecord) -> Result<(), HeaderRecord> {
        self.checksum.push_header(header)
    }

    /// A header for a datagram from the local address.
    pub fn udp_header(&self, src_port: u16, dest_ip: Ipv4Addr, dest_port: u16) -> HeaderRecord {
        HeaderRecord::udp(
            self.config.arp.local_mac,
            self.config.arp.local_ip,
            src_port,
            dest_ip,
            dest_port,
        )
    }

    /// Hands an incoming ARP frame to the resolver. Returns it if the resolver has no room
    /// for a reply.
    pub fn receive_arp(&mut self, frame: ArpFrame) -> Result<(), ArpFrame> {
        self.assembler.resolver().push(frame)
    }

    pub fn seed_arp(&mut self, ip: Ipv4Addr, mac: MacAddr) {
        self.assembler.resolver().seed(ip, mac);
    }

    pub fn clear_arp_cache(&mut self) {
        self.assembler.resolver().clear_cache();
    }

    pub fn arp_stats(&mut self) -> ArpStats {
        self.assembler.resolver().stats()
    }

    pub fn frames_sent(&self) -> u64 {
        self.assembler.frames_sent()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.assembler.frames_dropped()
    }

    /// Frames the egress buffer discarded, bad or too long for it.
    pub fn egress_dropped(&self) -> u64 {
        self.egress
            .as_ref()
            .map_or(0, |egress| egress.dropped_frames() + egress.overflowed_frames())
    }

    /// Grants per arbiter input, indexed by `UDP_PORT` and `ARP_PORT`.
    pub fn grants(&self) -> &[u64] {
        self.arbiter.grants()
    }

    /// Transfers and stalls of every internal edge.
    pub fn channel_stats(&self) -> Vec<(&'static str, u64, u64)> {
        let c = &self.channels;
        vec![
            &c.headers,
            &c.payload,
            &c.udp_frames,
            &c.arp_frames,
            &c.arp_words,
            &c.merged,
            &c.egress,
        ]
        .into_iter()
        .map(|ch| (ch.name(), ch.transfers(), ch.stalls()))
        .collect()
    }
}

impl Consumer<StreamWord> for UdpStack {
    fn ready(&self) -> bool {
        self.checksum.ready()
    }

    fn push(&mut self, word: StreamWord) -> Result<(), StreamWord> {
        self.checksum.push(word)
    }
}

impl Producer<StreamWord> for UdpStack {
    fn peek(&self) -> Option<&StreamWord> {
        match &self.egress {
            Some(egress) => egress.peek(),
            None => self.adapter.peek(),
        }
    }

    fn pop(&mut self) -> Option<StreamWord> {
        match &mut self.egress {
            Some(egress) => egress.pop(),
            None => self.adapter.pop(),
        }
    }
}

impl Stage for UdpStack {
    fn tick(&mut self) {
        let c = &mut self.channels;

        if let Some(egress) = &mut self.egress {
            c.egress.step(&mut self.adapter, egress);
        }
        c.merged.step(&mut self.arbiter, &mut self.adapter);
        self.adapter.tick();
        self.arbiter.tick();

        c.udp_frames
            .step(&mut self.assembler, &mut self.arbiter.port(UDP_PORT));
        c.arp_words
            .step(&mut self.serializer, &mut self.arbiter.port(ARP_PORT));
        c.arp_frames
            .step(self.assembler.resolver().tx(), &mut self.serializer);
        self.serializer.tick();

        self.assembler.tick();
        c.headers.step(self.checksum.headers(), &mut self.assembler);
        c.payload.step(self.checksum.payload(), &mut self.assembler);
        self.checksum.tick();

        self.ticks += 1;
    }

    fn busy(&self) -> bool {
        self.checksum.busy()
            || self.assembler.busy()
            || self.serializer.busy()
            || self.arbiter.busy()
            || self.adapter.busy()
            || self
                .egress
                .as_ref()
                .map_or(false, |egress| !egress.is_empty() || egress.pending() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::transfer;
    use crate::config::OutputConfig;
    use crate::utils::test::stages::{VecSink, VecSource};
    use crate::word::{depacketize, frames, packetize};
    use ethstream_packets::{ArpOp, EthernetFrame, UDP_FRAME_HEADER_LEN};
    use std::convert::TryFrom;

    const PEER_MAC: MacAddr = MacAddr {
        bytes: [0x02, 0, 0, 0, 0, 0x64],
    };

    fn peer() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 100)
    }

    fn run(stack: &mut UdpStack, payload: Vec<StreamWord>) -> Vec<Vec<StreamWord>> {
        let mut src = VecSource::new(payload);
        let mut sink = VecSink::new();
        for _ in 0..10_000 {
            transfer(&mut *stack, &mut sink);
            transfer(&mut src, &mut *stack);
            stack.tick();
            if src.is_empty() && !stack.busy() {
                break;
            }
        }
        frames(sink.into_items())
    }

    #[test]
    fn datagram_leaves_as_eight_byte_words() {
        let mut stack = UdpStack::new(&StackConfig::default()).unwrap();
        stack.seed_arp(peer(), PEER_MAC);
        let header = stack.udp_header(1234, peer(), 5678);
        stack.push_header(header).unwrap();

        let out = run(&mut stack, packetize(&[1, 2, 3, 4], 1));
        assert_eq!(out.len(), 1);
        assert!(out[0].iter().all(|w| w.width() == 8 && !w.user));

        let bytes = depacketize(&out[0]);
        assert_eq!(bytes.len(), UDP_FRAME_HEADER_LEN + 4);
        assert_eq!(&bytes[0..6], &PEER_MAC.bytes);
        // UDP checksum field
        assert_eq!(&bytes[40..42], &[0x5c, 0x9b]);
        assert_eq!(&bytes[42..], &[1, 2, 3, 4]);
        assert_eq!(stack.frames_sent(), 1);
        assert_eq!(stack.grants(), &[1, 0]);
    }

    #[test]
    fn unknown_peer_triggers_request_then_sends() {
        let mut stack = UdpStack::new(&StackConfig::default()).unwrap();
        let header = stack.udp_header(1234, peer(), 5678);
        stack.push_header(header).unwrap();

        let mut src = VecSource::new(packetize(&[9; 20], 1));
        let mut sink = VecSink::new();
        for _ in 0..200 {
            transfer(&mut stack, &mut sink);
            transfer(&mut src, &mut stack);
            stack.tick();
        }
        let out = frames(sink.into_items());
        assert_eq!(out.len(), 1);
        let request = ArpFrame::try_from(EthernetFrame::from_buffer(depacketize(&out[0])).unwrap())
            .unwrap();
        assert_eq!(request.op(), Some(ArpOp::Request));
        assert_eq!(request.target_protocol_addr(), peer());

        let local = stack.config().arp;
        stack
            .receive_arp(ArpFrame::reply(PEER_MAC, peer(), local.local_mac, local.local_ip))
            .unwrap();
        let out = run(&mut stack, vec![]);
        assert_eq!(out.len(), 1);
        assert_eq!(depacketize(&out[0]).len(), UDP_FRAME_HEADER_LEN + 20);
        assert_eq!(stack.arp_stats().requests_sent, 1);
    }

    #[test]
    fn answers_arp_requests_on_its_own_port() {
        let config = StackConfig {
            output: OutputConfig {
                width: 4,
                update_id: true,
                ..OutputConfig::default()
            },
            ..StackConfig::default()
        };
        let mut stack = UdpStack::new(&config).unwrap();
        let asker = Ipv4Addr::new(192, 168, 1, 50);
        stack
            .receive_arp(ArpFrame::request(PEER_MAC, asker, config.arp.local_ip))
            .unwrap();

        let out = run(&mut stack, vec![]);
        assert_eq!(out.len(), 1);
        assert!(out[0].iter().all(|w| w.id == ARP_PORT as u8));
        let reply = ArpFrame::try_from(EthernetFrame::from_buffer(depacketize(&out[0])).unwrap())
            .unwrap();
        assert_eq!(reply.op(), Some(ArpOp::Reply));
        assert_eq!(reply.target_protocol_addr(), asker);
        assert_eq!(stack.grants(), &[0, 1]);
    }

    #[test]
    fn poisoned_datagram_dropped_at_egress() {
        let mut stack = UdpStack::new(&StackConfig::default().drop_bad_frames(64)).unwrap();
        stack.seed_arp(peer(), PEER_MAC);

        let header = stack.udp_header(1234, peer(), 5678);
        stack.push_header(header).unwrap();
        let mut words = packetize(&[1, 2, 3, 4, 5, 6], 1);
        words[2].user = true;
        assert!(run(&mut stack, words).is_empty());
        assert_eq!(stack.egress_dropped(), 1);
        assert_eq!(stack.frames_sent(), 1);

        stack.push_header(header).unwrap();
        let out = run(&mut stack, packetize(&[1, 2, 3, 4], 1));
        assert_eq!(out.len(), 1);
        assert!(out[0].iter().all(|w| !w.user));
        assert_eq!(&depacketize(&out[0])[40..42], &[0x5c, 0x9b]);
        assert_eq!(stack.egress_dropped(), 1);
    }

    #[test]
    fn poisoned_datagram_passes_without_egress_buffer() {
        let mut stack = UdpStack::new(&StackConfig::default()).unwrap();
        stack.seed_arp(peer(), PEER_MAC);
        let header = stack.udp_header(1234, peer(), 5678);
        stack.push_header(header).unwrap();
        let mut words = packetize(&[1, 2, 3, 4, 5, 6], 1);
        words[2].user = true;

        let out = run(&mut stack, words);
        assert_eq!(out.len(), 1);
        assert!(out[0].last().unwrap().user);
        assert_eq!(stack.egress_dropped(), 0);
    }

    #[test]
    fn rejects_invalid_config() {
        let config = StackConfig::default().output_width(3);
        assert!(UdpStack::new(&config).is_ok());
        let config = StackConfig::default().output_width(0);
        assert_eq!(
            UdpStack::new(&config).err(),
            Some(ConfigError::WidthOutOfRange(0))
        );
    }
}
