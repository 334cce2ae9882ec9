use crate::channel::{Consumer, Producer, Stage};
use crate::config::StackConfig;
use crate::link::{Link, LinkBuilder, PacketStream};
use crate::stack::{Datagram, UdpStack};
use crate::word::{packetize, StreamWord};
use crossbeam::crossbeam_channel::{Receiver, TryRecvError};
use ethstream_packets::{ArpFrame, MacAddr};
use futures::prelude::*;
use futures::task::{Context, Poll};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::pin::Pin;
use tracing::{debug, info, warn};

/// Ticks a stack may run in one poll before the task yields.
const TICKS_PER_POLL: usize = 256;

/// Runs a `UdpStack` on a stream of datagrams and offers the Ethernet frames it emits, at the
/// stack's output width. Incoming ARP frames come in on a crossbeam channel, since they arrive
/// from the wire side rather than from upstream.
///
/// The stack is clocked by polling: each poll ticks it until a word comes out, the input has
/// nothing to give, or `TICKS_PER_POLL` ticks have passed. While the stack has work of its own,
/// such as an ARP retry timer, the task reschedules itself instead of waiting on the input.
#[derive(Default)]
pub struct StackLink {
    in_stream: Option<PacketStream<Datagram>>,
    config: StackConfig,
    arp_receiver: Option<Receiver<ArpFrame>>,
    neighbors: Vec<(Ipv4Addr, MacAddr)>,
}

impl StackLink {
    pub fn config(self, config: StackConfig) -> Self {
        StackLink { config, ..self }
    }

    pub fn arp_channel(self, arp_receiver: Receiver<ArpFrame>) -> Self {
        StackLink {
            arp_receiver: Some(arp_receiver),
            ..self
        }
    }

    /// Binds `ip` to `mac` in the ARP cache before the first datagram.
    pub fn neighbor(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.neighbors.push((ip, mac));
        self
    }
}

impl LinkBuilder<Datagram, StreamWord> for StackLink {
    fn new() -> Self {
        StackLink {
            in_stream: None,
            config: StackConfig::default(),
            arp_receiver: None,
            neighbors: vec![],
        }
    }

    fn ingressors(self, mut in_streams: Vec<PacketStream<Datagram>>) -> Self {
        assert_eq!(in_streams.len(), 1, "StackLink may only take 1 input stream");
        self.ingressor(in_streams.remove(0))
    }

    fn ingressor(self, in_stream: PacketStream<Datagram>) -> Self {
        if self.in_stream.is_some() {
            panic!("StackLink may only take 1 input stream")
        }

        StackLink {
            in_stream: Some(in_stream),
            ..self
        }
    }

    fn build_link(self) -> Link<StreamWord> {
        let in_stream = match self.in_stream {
            None => panic!("Cannot build link! Missing input stream"),
            Some(in_stream) => in_stream,
        };
        let mut stack = match UdpStack::new(&self.config) {
            Ok(stack) => stack,
            Err(e) => panic!("Cannot build link! {}", e),
        };
        for (ip, mac) in self.neighbors {
            stack.seed_arp(ip, mac);
        }

        (
            vec![],
            vec![Box::new(StackRunner {
                in_stream,
                stack,
                arp_receiver: self.arp_receiver,
                held_arp: None,
                payload: VecDeque::new(),
                finished: false,
            })],
        )
    }
}

struct StackRunner {
    in_stream: PacketStream<Datagram>,
    stack: UdpStack,
    arp_receiver: Option<Receiver<ArpFrame>>,
    /// An ARP frame the stack had no room for yet.
    held_arp: Option<ArpFrame>,
    /// Words of the current datagram not yet taken by the stack.
    payload: VecDeque<StreamWord>,
    finished: bool,
}

impl StackRunner {
    fn deliver_arp(&mut self) {
        if self.held_arp.is_none() {
            if let Some(receiver) = &self.arp_receiver {
                match receiver.try_recv() {
                    Ok(frame) => self.held_arp = Some(frame),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => self.arp_receiver = None,
                }
            }
        }
        if let Some(frame) = self.held_arp.take() {
            self.held_arp = self.stack.receive_arp(frame).err();
        }
    }

    /// Moves the header of `datagram` into the stack and queues its payload. A datagram without
    /// payload cannot be framed, so it goes in as a single word with nothing kept, which the
    /// checksum stage poisons.
    fn start(&mut self, datagram: Datagram) {
        if self.stack.push_header(datagram.header).is_err() {
            unreachable!("StackRunner::start: header pushed while the stack was not ready");
        }
        let width = self.stack.config().output.width;
        self.payload = if datagram.payload.is_empty() {
            warn!("datagram without payload");
            vec![StreamWord::new(vec![0; width], 0, true)].into()
        } else {
            packetize(&datagram.payload, width).into()
        };
    }

    fn log_stats(&mut self) {
        let stats = self.stack.arp_stats();
        info!(
            ticks = self.stack.ticks(),
            datagrams_sent = self.stack.frames_sent(),
            datagrams_dropped = self.stack.frames_dropped(),
            egress_dropped = self.stack.egress_dropped(),
            arp_requests = stats.requests_sent,
            arp_failures = stats.failed,
            "stack finished"
        );
        for (name, transfers, stalls) in self.stack.channel_stats() {
            debug!(channel = name, transfers, stalls);
        }
    }
}

impl Unpin for StackRunner {}

impl Stream for StackRunner {
    type Item = StreamWord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        for _ in 0..TICKS_PER_POLL {
            if let Some(word) = self.stack.pop() {
                return Poll::Ready(Some(word));
            }
            self.deliver_arp();

            let mut input_pending = false;
            if self.payload.is_empty() {
                if !self.finished && self.stack.header_ready() {
                    match Pin::new(&mut self.in_stream).poll_next(cx) {
                        Poll::Ready(Some(datagram)) => self.start(datagram),
                        Poll::Ready(None) => self.finished = true,
                        Poll::Pending => input_pending = true,
                    }
                }
            } else if self.stack.ready() {
                if let Some(word) = self.payload.pop_front() {
                    if self.stack.push(word).is_err() {
                        unreachable!("StackRunner::poll_next: push to a ready stack failed");
                    }
                }
            }

            self.stack.tick();
            if self.stack.peek().is_some() {
                continue;
            }

            let idle = !self.stack.busy() && self.payload.is_empty() && self.held_arp.is_none();
            if idle && self.finished {
                self.log_stats();
                return Poll::Ready(None);
            }
            if idle && input_pending {
                // The input has our waker, the ARP channel cannot wake us.
                if self.arp_receiver.is_some() {
                    cx.waker().wake_by_ref();
                }
                return Poll::Pending;
            }
        }
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test::harness::{initialize_runtime, run_link};
    use crate::utils::test::packet_generators::{immediate_stream, PacketIntervalGenerator};
    use crate::word::{depacketize, frames};
    use core::time;
    use crossbeam::crossbeam_channel;
    use ethstream_packets::{ArpOp, EthernetFrame, UDP_FRAME_HEADER_LEN};
    use std::convert::TryFrom;
    use std::thread;

    const PEER_MAC: MacAddr = MacAddr {
        bytes: [0x02, 0, 0, 0, 0, 0x64],
    };

    fn peer() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 100)
    }

    fn datagram(src_port: u16, payload: &[u8]) -> Datagram {
        let arp = StackConfig::default().arp;
        Datagram::new(
            ethstream_packets::HeaderRecord::udp(
                arp.local_mac,
                arp.local_ip,
                src_port,
                peer(),
                5678,
            ),
            payload.to_vec(),
        )
    }

    #[test]
    #[should_panic]
    fn panics_when_built_without_input_streams() {
        StackLink::new().build_link();
    }

    #[test]
    #[should_panic(expected = "Cannot build link!")]
    fn panics_on_invalid_config() {
        StackLink::new()
            .ingressor(immediate_stream(vec![]))
            .config(StackConfig::default().output_width(0))
            .build_link();
    }

    #[test]
    fn seeded_neighbor_gets_every_datagram() {
        let datagrams: Vec<Datagram> = (1..=5u16)
            .map(|i| datagram(1000 + i, &vec![i as u8; 10 * i as usize]))
            .collect();

        let mut runtime = initialize_runtime();
        let results = runtime.block_on(async {
            let link = StackLink::new()
                .ingressor(immediate_stream(datagrams))
                .neighbor(peer(), PEER_MAC)
                .build_link();
            run_link(link).await
        });

        let out = frames(results[0].clone());
        assert_eq!(out.len(), 5);
        for (i, frame) in (1..=5usize).zip(out) {
            assert!(frame.iter().all(|w| w.width() == 8 && !w.user));
            let bytes = depacketize(&frame);
            assert_eq!(bytes.len(), UDP_FRAME_HEADER_LEN + 10 * i);
            assert_eq!(&bytes[0..6], &PEER_MAC.bytes);
            assert_eq!(&bytes[UDP_FRAME_HEADER_LEN..], &vec![i as u8; 10 * i][..]);
        }
    }

    #[test]
    fn worked_example_from_a_slow_source() {
        let mut runtime = initialize_runtime();
        let results = runtime.block_on(async {
            let slow = PacketIntervalGenerator::new(
                time::Duration::from_millis(10),
                vec![datagram(1234, &[1, 2, 3, 4])].into_iter(),
            );
            let link = StackLink::new()
                .ingressor(Box::new(slow))
                .neighbor(peer(), PEER_MAC)
                .build_link();
            run_link(link).await
        });

        let bytes = depacketize(&results[0]);
        assert_eq!(bytes.len(), UDP_FRAME_HEADER_LEN + 4);
        assert_eq!(&bytes[24..26], &[0xb6, 0x98]);
        assert_eq!(&bytes[40..42], &[0x5c, 0x9b]);
    }

    #[test]
    fn empty_payload_comes_out_poisoned() {
        let mut runtime = initialize_runtime();
        let results = runtime.block_on(async {
            let link = StackLink::new()
                .ingressor(immediate_stream(vec![datagram(1, &[])]))
                .neighbor(peer(), PEER_MAC)
                .build_link();
            run_link(link).await
        });
        let out = frames(results[0].clone());
        assert_eq!(out.len(), 1);
        assert!(out[0].last().unwrap().user);
    }

    #[test]
    fn answers_its_own_arp_request() {
        let local = StackConfig::default().arp;
        let (arp_sender, arp_receiver) = crossbeam_channel::unbounded();
        let (word_sender, word_receiver) = crossbeam_channel::unbounded::<StreamWord>();

        // Plays the neighbor: answers the first request it sees on the wire.
        let neighbor = thread::spawn(move || {
            let mut frame = vec![];
            let mut answered = false;
            let mut udp = vec![];
            for word in word_receiver.iter() {
                let last = word.last;
                frame.push(word);
                if !last {
                    continue;
                }
                let bytes = depacketize(&frame);
                frame.clear();
                let ethernet = EthernetFrame::from_buffer(bytes.clone()).unwrap();
                match ArpFrame::try_from(ethernet) {
                    Ok(request) => {
                        assert_eq!(request.op(), Some(ArpOp::Request));
                        assert_eq!(request.target_protocol_addr(), peer());
                        if !answered {
                            let reply =
                                ArpFrame::reply(PEER_MAC, peer(), local.local_mac, local.local_ip);
                            arp_sender.send(reply).unwrap();
                            answered = true;
                        }
                    }
                    Err(_) => udp.push(bytes),
                }
            }
            udp
        });

        let mut runtime = initialize_runtime();
        runtime.block_on(async {
            let (_, mut egressors) = StackLink::new()
                .ingressor(immediate_stream(vec![datagram(7, b"resolve me")]))
                .arp_channel(arp_receiver)
                .build_link();
            let mut egress = egressors.remove(0);
            while let Some(word) = egress.next().await {
                word_sender.send(word).unwrap();
            }
            drop(word_sender);
        });

        let udp = neighbor.join().unwrap();
        assert_eq!(udp.len(), 1);
        assert_eq!(&udp[0][0..6], &PEER_MAC.bytes);
        assert_eq!(&udp[0][UDP_FRAME_HEADER_LEN..], b"resolve me");
    }
}
