use crate::link::{IngressLinkBuilder, Link, LinkBuilder, PacketStream};
use crossbeam::crossbeam_channel::TryRecvError;
use crossbeam::Receiver;
use futures::prelude::*;
use futures::task::{Context, Poll};
use std::pin::Pin;

/// The entrance of a task graph. Hands out the receiving end of a crossbeam channel as an
/// egress stream, so a thread outside the runtime can feed datagrams or words in.
#[derive(Default)]
pub struct InputChannelLink<Packet> {
    receiver: Option<Receiver<Packet>>,
}

impl<Packet: Send + 'static> IngressLinkBuilder<Packet> for InputChannelLink<Packet> {
    type Receiver = Receiver<Packet>;

    fn channel(self, receiver: Receiver<Packet>) -> Self {
        InputChannelLink {
            receiver: Some(receiver),
        }
    }
}

impl<Packet: Send + 'static> LinkBuilder<(), Packet> for InputChannelLink<Packet> {
    fn new() -> Self {
        InputChannelLink { receiver: None }
    }

    fn ingressors(self, _in_streams: Vec<PacketStream<()>>) -> Self {
        panic!("InputChannelLink is fed through its channel, not by streams")
    }

    fn ingressor(self, _in_stream: PacketStream<()>) -> Self {
        panic!("InputChannelLink is fed through its channel, not by streams")
    }

    fn build_link(self) -> Link<Packet> {
        let receiver = match self.receiver {
            Some(receiver) => receiver,
            None => panic!("Cannot build link! Missing channel"),
        };
        (vec![], vec![Box::new(ChannelStream { receiver })])
    }
}

struct ChannelStream<Packet> {
    receiver: Receiver<Packet>,
}

impl<Packet> Unpin for ChannelStream<Packet> {}

impl<Packet> Stream for ChannelStream<Packet> {
    type Item = Packet;

    /// Nothing outside the runtime holds our waker, so an empty channel asks to be polled
    /// again right away. Ends after the last sender hangs up.
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Packet>> {
        let received = self.receiver.try_recv();
        match received {
            Ok(packet) => Poll::Ready(Some(packet)),
            Err(TryRecvError::Disconnected) => Poll::Ready(None),
            Err(TryRecvError::Empty) => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Datagram;
    use crate::utils::test::harness::{initialize_runtime, run_link};
    use crate::utils::test::packet_generators::immediate_stream;
    use crate::word::{packetize, StreamWord};
    use ethstream_packets::{HeaderRecord, MacAddr};
    use std::net::Ipv4Addr;
    use std::thread;
    use std::time::Duration;

    #[test]
    #[should_panic(expected = "not by streams")]
    fn refuses_input_streams() {
        InputChannelLink::<StreamWord>::new().ingressors(vec![immediate_stream(vec![])]);
    }

    #[test]
    #[should_panic(expected = "Missing channel")]
    fn needs_a_channel() {
        InputChannelLink::<StreamWord>::new().build_link();
    }

    #[test]
    fn queued_words_come_out_in_order() {
        let words = packetize(&[9, 8, 7, 6, 5, 4, 3], 2);
        let (sender, receiver) = crossbeam::unbounded();
        for word in words.iter().cloned() {
            sender.send(word).unwrap();
        }
        drop(sender);

        let mut runtime = initialize_runtime();
        let results =
            runtime.block_on(run_link(InputChannelLink::new().channel(receiver).build_link()));
        assert_eq!(results[0], words);
    }

    #[test]
    fn datagrams_trickle_in_from_a_thread() {
        let header = HeaderRecord::udp(
            MacAddr::new([2, 0, 0, 0, 0, 1]),
            Ipv4Addr::new(192, 168, 1, 128),
            1234,
            Ipv4Addr::new(192, 168, 1, 100),
            5678,
        );
        let datagrams: Vec<Datagram> = (1..=5u8)
            .map(|n| Datagram::new(header, vec![n; n as usize]))
            .collect();
        let to_send = datagrams.clone();
        let (sender, receiver) = crossbeam::crossbeam_channel::bounded::<Datagram>(1);
        let source = thread::spawn(move || {
            for datagram in to_send {
                thread::sleep(Duration::from_millis(2));
                sender.send(datagram).unwrap();
            }
        });

        let mut runtime = initialize_runtime();
        let results =
            runtime.block_on(run_link(InputChannelLink::new().channel(receiver).build_link()));
        source.join().unwrap();
        assert_eq!(results[0], datagrams);
    }
}
