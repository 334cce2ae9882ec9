use crate::link::{EgressLinkBuilder, Link, LinkBuilder, PacketStream};
use crossbeam::Sender;
use futures::prelude::*;
use futures::task::{Context, Poll};
use std::pin::Pin;
use tracing::debug;

/// The exit of a task graph: forwards every item of one egress stream into a crossbeam
/// channel read by code outside the runtime.
#[derive(Default)]
pub struct OutputChannelLink<Packet> {
    in_stream: Option<PacketStream<Packet>>,
    sender: Option<Sender<Packet>>,
}

impl<Packet: Send + 'static> EgressLinkBuilder<Packet> for OutputChannelLink<Packet> {
    type Sender = Sender<Packet>;

    fn channel(self, sender: Sender<Packet>) -> Self {
        OutputChannelLink {
            sender: Some(sender),
            ..self
        }
    }
}

impl<Packet: Send + 'static> LinkBuilder<Packet, ()> for OutputChannelLink<Packet> {
    fn new() -> Self {
        OutputChannelLink {
            in_stream: None,
            sender: None,
        }
    }

    fn ingressors(self, in_streams: Vec<PacketStream<Packet>>) -> Self {
        let mut in_streams = in_streams.into_iter();
        match (in_streams.next(), in_streams.next()) {
            (Some(in_stream), None) => self.ingressor(in_stream),
            _ => panic!("OutputChannelLink drains exactly one stream"),
        }
    }

    fn ingressor(self, in_stream: PacketStream<Packet>) -> Self {
        assert!(
            self.in_stream.is_none(),
            "OutputChannelLink drains exactly one stream"
        );
        OutputChannelLink {
            in_stream: Some(in_stream),
            ..self
        }
    }

    /// The only runnable is the forwarder, and nothing is left to chain after it.
    fn build_link(self) -> Link<()> {
        let in_stream = match self.in_stream {
            Some(in_stream) => in_stream,
            None => panic!("Cannot build link! Missing input streams"),
        };
        let sender = match self.sender {
            Some(sender) => sender,
            None => panic!("Cannot build link! Missing channel"),
        };
        let forwarder = ChannelForwarder {
            in_stream,
            sender,
            forwarded: 0,
        };
        (vec![Box::new(forwarder)], vec![])
    }
}

struct ChannelForwarder<Packet> {
    in_stream: PacketStream<Packet>,
    sender: Sender<Packet>,
    forwarded: u64,
}

impl<Packet> Unpin for ChannelForwarder<Packet> {}

impl<Packet> Future for ChannelForwarder<Packet> {
    type Output = ();

    /// Done once the stream ends or nobody is reading the channel any more.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
        let forwarder = &mut *self;
        while !forwarder.sender.is_full() {
            let packet = match forwarder.in_stream.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(packet)) => packet,
                Poll::Ready(None) => {
                    debug!(forwarded = forwarder.forwarded, "egress stream ended");
                    return Poll::Ready(());
                }
            };
            if forwarder.sender.try_send(packet).is_err() {
                debug!(forwarded = forwarder.forwarded, "egress channel closed");
                return Poll::Ready(());
            }
            forwarder.forwarded += 1;
        }
        // Whoever drains the channel lives outside the runtime and cannot wake us, so poll
        // again on the next pass.
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test::harness::{initialize_runtime, run_link};
    use crate::utils::test::packet_generators::immediate_stream;
    use crate::word::{depacketize, packetize, StreamWord};
    use std::thread;

    fn fifty_bytes() -> Vec<u8> {
        (0..50).collect()
    }

    #[test]
    #[should_panic(expected = "Missing input streams")]
    fn needs_a_stream_to_drain() {
        let (sender, _receiver) = crossbeam::unbounded::<StreamWord>();
        OutputChannelLink::new().channel(sender).build_link();
    }

    #[test]
    #[should_panic(expected = "Missing channel")]
    fn needs_a_channel() {
        OutputChannelLink::<StreamWord>::new()
            .ingressor(immediate_stream(vec![]))
            .build_link();
    }

    #[test]
    #[should_panic(expected = "exactly one stream")]
    fn drains_a_single_stream() {
        OutputChannelLink::<StreamWord>::new()
            .ingressors(vec![immediate_stream(vec![]), immediate_stream(vec![])]);
    }

    #[test]
    fn frame_reaches_an_unbounded_channel() {
        let words = packetize(&fifty_bytes(), 8);
        let (sender, receiver) = crossbeam::unbounded::<StreamWord>();

        let mut runtime = initialize_runtime();
        let egress = runtime.block_on(run_link(
            OutputChannelLink::new()
                .ingressor(immediate_stream(words.clone()))
                .channel(sender)
                .build_link(),
        ));
        assert!(egress.is_empty());
        assert_eq!(receiver.iter().collect::<Vec<_>>(), words);
    }

    #[test]
    fn waits_on_a_slow_reader() {
        let (sender, receiver) = crossbeam::crossbeam_channel::bounded::<StreamWord>(2);
        let reader = thread::spawn(move || receiver.iter().collect::<Vec<_>>());

        let mut runtime = initialize_runtime();
        runtime.block_on(run_link(
            OutputChannelLink::new()
                .ingressor(immediate_stream(packetize(&fifty_bytes(), 4)))
                .channel(sender)
                .build_link(),
        ));
        let words = reader.join().unwrap();
        assert_eq!(words.len(), 13);
        assert_eq!(depacketize(&words), fifty_bytes());
    }

    #[test]
    fn gives_up_once_the_reader_is_gone() {
        let (sender, receiver) = crossbeam::unbounded::<StreamWord>();
        drop(receiver);

        let mut runtime = initialize_runtime();
        let egress = runtime.block_on(run_link(
            OutputChannelLink::new()
                .ingressor(immediate_stream(packetize(&[1, 2, 3], 1)))
                .channel(sender)
                .build_link(),
        ));
        assert!(egress.is_empty());
    }
}
