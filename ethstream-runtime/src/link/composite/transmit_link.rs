use crate::config::StackConfig;
use crate::link::primitive::{AdapterLink, JoinLink, ProcessLink, QueueLink, StackLink};
use crate::link::{Link, LinkBuilder, PacketStream, ProcessLinkBuilder};
use crate::processor::{FrameCheck, Trace};
use crate::stack::Datagram;
use crate::word::StreamWord;
use crossbeam::crossbeam_channel::Receiver;
use ethstream_packets::{ArpFrame, MacAddr};
use std::net::Ipv4Addr;

/// The transmit path as a graph of tasks, one per stage, with a queue at every task boundary:
///
/// ```text
/// datagrams[0..n] ─► JoinLink ─► QueueLink ─► StackLink ─► QueueLink ──┐
///                                 (Trace)     ▲ ARP frames  (FrameCheck)│
///                                                                      │
///                          wire ◄── ProcessLink ◄── AdapterLink ◄──────┘
///                                   (Trace)
/// ```
///
/// Sources are merged a datagram at a time. Words leave the stack at its configured output
/// width, are checked while they cross to the wire task, and are reshaped to `wire_width`.
/// The last stage logs every wire word at `trace` level.
#[derive(Default)]
pub struct TransmitLink {
    in_streams: Option<Vec<PacketStream<Datagram>>>,
    config: StackConfig,
    wire_width: Option<usize>,
    queue_capacity: usize,
    word_queue_capacity: usize,
    arp_receiver: Option<Receiver<ArpFrame>>,
    neighbors: Vec<(Ipv4Addr, MacAddr)>,
}

impl TransmitLink {
    pub fn config(self, config: StackConfig) -> Self {
        TransmitLink { config, ..self }
    }

    /// Width of the words handed to the wire. Defaults to the stack's output width.
    pub fn wire_width(self, wire_width: usize) -> Self {
        TransmitLink {
            wire_width: Some(wire_width),
            ..self
        }
    }

    /// Changes the datagram queue capacities, default value is 10.
    pub fn queue_capacity(self, queue_capacity: usize) -> Self {
        assert!(
            queue_capacity > 0,
            "TransmitLink queue capacity: {} must be > 0",
            queue_capacity
        );
        TransmitLink {
            queue_capacity,
            ..self
        }
    }

    /// Changes the capacity of the word queue in front of the wire, default value is 64.
    pub fn word_queue_capacity(self, word_queue_capacity: usize) -> Self {
        assert!(
            word_queue_capacity > 0,
            "TransmitLink word queue capacity: {} must be > 0",
            word_queue_capacity
        );
        TransmitLink {
            word_queue_capacity,
            ..self
        }
    }

    pub fn arp_channel(self, arp_receiver: Receiver<ArpFrame>) -> Self {
        TransmitLink {
            arp_receiver: Some(arp_receiver),
            ..self
        }
    }

    pub fn neighbor(mut self, ip: Ipv4Addr, mac: MacAddr) -> Self {
        self.neighbors.push((ip, mac));
        self
    }
}

impl LinkBuilder<Datagram, StreamWord> for TransmitLink {
    fn new() -> Self {
        TransmitLink {
            in_streams: None,
            config: StackConfig::default(),
            wire_width: None,
            queue_capacity: 10,
            word_queue_capacity: 64,
            arp_receiver: None,
            neighbors: vec![],
        }
    }

    fn ingressors(self, in_streams: Vec<PacketStream<Datagram>>) -> Self {
        assert!(
            !in_streams.is_empty(),
            "Input streams: {} must be > 0",
            in_streams.len()
        );
        if self.in_streams.is_some() {
            panic!("TransmitLink already has input streams")
        }

        TransmitLink {
            in_streams: Some(in_streams),
            ..self
        }
    }

    fn ingressor(self, in_stream: PacketStream<Datagram>) -> Self {
        match self.in_streams {
            None => TransmitLink {
                in_streams: Some(vec![in_stream]),
                ..self
            },
            Some(mut existing_streams) => {
                existing_streams.push(in_stream);
                TransmitLink {
                    in_streams: Some(existing_streams),
                    ..self
                }
            }
        }
    }

    fn build_link(self) -> Link<StreamWord> {
        let in_streams = match self.in_streams {
            None => panic!("Cannot build link! Missing input streams"),
            Some(in_streams) => in_streams,
        };
        let stack_width = self.config.output.width;
        let wire_width = self.wire_width.unwrap_or(stack_width);

        let (mut runnables, join_egressors) = JoinLink::new()
            .ingressors(in_streams)
            .queue_capacity(self.queue_capacity)
            .build_link();

        let (mut datagram_runnables, datagram_egressors) = QueueLink::new()
            .ingressors(join_egressors)
            .processor(Trace::new("datagrams"))
            .queue_capacity(self.queue_capacity)
            .build_link();
        runnables.append(&mut datagram_runnables);

        let mut stack = StackLink::new()
            .ingressors(datagram_egressors)
            .config(self.config);
        if let Some(arp_receiver) = self.arp_receiver {
            stack = stack.arp_channel(arp_receiver);
        }
        for (ip, mac) in self.neighbors {
            stack = stack.neighbor(ip, mac);
        }
        let (_, stack_egressors) = stack.build_link();

        let (mut word_runnables, word_egressors) = QueueLink::new()
            .ingressors(stack_egressors)
            .processor(FrameCheck::new(stack_width))
            .queue_capacity(self.word_queue_capacity)
            .build_link();
        runnables.append(&mut word_runnables);

        let (_, reshaped) = AdapterLink::new()
            .ingressors(word_egressors)
            .widths(stack_width, wire_width)
            .build_link();
        let (_, wire) = ProcessLink::new()
            .ingressors(reshaped)
            .processor(Trace::new("wire"))
            .build_link();

        (runnables, wire)
    }
}
