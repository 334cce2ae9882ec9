use crate::link::utils::feeder::QueueFeeder;
use crate::link::utils::task_park::*;
use crate::link::{Link, LinkBuilder, PacketStream, TokioRunnable};
use crate::word::Framed;
use crossbeam::atomic::AtomicCell;
use crossbeam::crossbeam_channel::{self, Receiver, TryRecvError};
use futures::prelude::*;
use futures::task::{Context, Poll, Waker};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{trace, warn};

/// Merges any number of framed streams into one. Each input gets its own queue and task; the
/// egressor grants one input at a time and stays on it until the frame's last item has gone
/// out, so frames are never interleaved. Grants rotate round robin, starting after the input
/// that was served last.
#[derive(Default)]
pub struct JoinLink<Packet: Framed + Send> {
    in_streams: Option<Vec<PacketStream<Packet>>>,
    queue_capacity: usize,
}

impl<Packet: Framed + Send> JoinLink<Packet> {
    /// Depth of each input's queue, 10 unless changed. Valid range is 1..=1000.
    pub fn queue_capacity(self, queue_capacity: usize) -> Self {
        assert!(
            (1..=1000).contains(&queue_capacity),
            "Queue capacity: {}, must be in range 1..=1000",
            queue_capacity
        );
        JoinLink {
            queue_capacity,
            ..self
        }
    }
}

impl<Packet: Framed + Send + 'static> LinkBuilder<Packet, Packet> for JoinLink<Packet> {
    fn new() -> Self {
        JoinLink {
            in_streams: None,
            queue_capacity: 10,
        }
    }

    fn ingressors(self, in_streams: Vec<PacketStream<Packet>>) -> Self {
        let mut ports = self.in_streams.unwrap_or_default();
        ports.extend(in_streams);
        assert!(
            (1..=1000).contains(&ports.len()),
            "number of in_streams: {}, must be in range 1..=1000",
            ports.len()
        );
        JoinLink {
            in_streams: Some(ports),
            queue_capacity: self.queue_capacity,
        }
    }

    /// Appends one more input; the new input's port number is its position.
    fn ingressor(self, in_stream: PacketStream<Packet>) -> Self {
        self.ingressors(vec![in_stream])
    }

    /// One feeder task per port, each with its own queue and park, and a single egress
    /// stream that arbitrates between the queues.
    fn build_link(self) -> Link<Packet> {
        let ports = match self.in_streams {
            Some(ports) => ports,
            None => panic!("Cannot build link! Missing input streams"),
        };

        let mut feeders: Vec<TokioRunnable> = Vec::with_capacity(ports.len());
        let mut queues = Vec::with_capacity(ports.len());
        let mut parks = Vec::with_capacity(ports.len());
        for port in ports {
            let (sender, receiver) = crossbeam_channel::bounded(self.queue_capacity);
            let park = new_task_park();
            feeders.push(Box::new(QueueFeeder::new(port, sender, park.clone(), Some)));
            queues.push(receiver);
            parks.push(park);
        }

        (feeders, vec![Box::new(JoinArbiter::new(queues, parks))])
    }
}

/// What a single receive from an input queue produced.
enum Pulled<Packet> {
    Packet(Packet),
    Ended,
    Empty,
}

pub struct JoinArbiter<Packet: Sized> {
    queues: Vec<Receiver<Option<Packet>>>,
    parks: Vec<TaskPark>,
    alive: Vec<bool>,
    live_ports: usize,
    next_port: usize,
    /// Input holding the grant while its frame is in flight.
    granted: Option<usize>,
}

impl<Packet: Framed> JoinArbiter<Packet> {
    fn new(queues: Vec<Receiver<Option<Packet>>>, parks: Vec<TaskPark>) -> Self {
        let live_ports = queues.len();
        JoinArbiter {
            alive: vec![true; live_ports],
            queues,
            parks,
            live_ports,
            next_port: 0,
            granted: None,
        }
    }

    fn pull(&mut self, port: usize) -> Pulled<Packet> {
        match self.queues[port].try_recv() {
            Ok(Some(packet)) => {
                unpark_and_wake(&self.parks[port]);
                Pulled::Packet(packet)
            }
            Ok(None) | Err(TryRecvError::Disconnected) => {
                if self.alive[port] {
                    self.alive[port] = false;
                    self.live_ports -= 1;
                }
                Pulled::Ended
            }
            Err(TryRecvError::Empty) => Pulled::Empty,
        }
    }

    /// Keeps the grant on `port` until the frame ends, then moves the rotation past it.
    fn emit(&mut self, port: usize, packet: Packet) -> Poll<Option<Packet>> {
        if packet.is_last() {
            self.granted = None;
            self.next_port = port + 1;
        } else if self.granted.is_none() {
            trace!(port, "join grant");
            self.granted = Some(port);
        }
        Poll::Ready(Some(packet))
    }

    /// Parks one shared waker slot with every live input. The first input to make progress
    /// wakes us; if none could take the slot they are all gone, so wake ourselves.
    fn park(&self, waker: &Waker) {
        let slot = Arc::new(AtomicCell::new(Some(waker.clone())));
        let mut parked = false;
        for (port, park) in self.parks.iter().enumerate() {
            if self.alive[port] && indirect_park_and_wake(park, Arc::clone(&slot)) {
                parked = true;
            }
        }
        if !parked {
            waker.wake_by_ref();
        }
    }
}

impl<Packet: Sized> Drop for JoinArbiter<Packet> {
    fn drop(&mut self) {
        for park in &self.parks {
            die_and_wake(park);
        }
    }
}

impl<Packet: Sized> Unpin for JoinArbiter<Packet> {}

impl<Packet: Framed> Stream for JoinArbiter<Packet> {
    type Item = Packet;

    /// While a frame is in flight only its input is polled. Otherwise the inputs are tried in
    /// rotation starting after the last one served, and the first item found takes the grant.
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        if let Some(port) = self.granted {
            match self.pull(port) {
                Pulled::Packet(packet) => return self.emit(port, packet),
                Pulled::Empty => {
                    park_and_wake(&self.parks[port], cx.waker().clone());
                    return Poll::Pending;
                }
                Pulled::Ended => {
                    warn!(port, "join input ended inside a frame");
                    self.granted = None;
                    self.next_port = port + 1;
                }
            }
        }

        let ports = self.queues.len();
        for offset in 0..ports {
            let port = (self.next_port + offset) % ports;
            if !self.alive[port] {
                continue;
            }
            if let Pulled::Packet(packet) = self.pull(port) {
                return self.emit(port, packet);
            }
        }

        if self.live_ports == 0 {
            return Poll::Ready(None);
        }
        self.park(cx.waker());
        Poll::Pending
    }
}
