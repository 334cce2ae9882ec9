//! Task-per-stage execution. A link is a set of futures to spawn plus the streams it
//! offers downstream; links are chained by handing one link's egress streams to the next
//! link's builder.

use crate::processor::Processor;
use futures::prelude::*;

/// Links that wrap one stage or one queue.
pub mod primitive;

/// Links built out of other links.
pub mod composite;

/// Wakeup plumbing shared by links that cross task boundaries.
pub mod utils;

pub type PacketStream<Input> = Box<dyn Stream<Item = Input> + Send + Unpin>;

/// A future the runtime must drive for a link to make progress.
pub type TokioRunnable = Box<dyn Future<Output = ()> + Send + Unpin>;

/// Runnables to spawn, and the egress streams of the link.
pub type Link<Output> = (Vec<TokioRunnable>, Vec<PacketStream<Output>>);

/// Builds a `Link`. Builders panic on misuse, such as building without input streams.
pub trait LinkBuilder<Input, Output> {
    fn new() -> Self;

    fn ingressors(self, in_streams: Vec<PacketStream<Input>>) -> Self;

    fn ingressor(self, in_stream: PacketStream<Input>) -> Self;

    fn build_link(self) -> Link<Output>;
}

pub trait ProcessLinkBuilder<P: Processor>: LinkBuilder<P::Input, P::Output> {
    fn processor(self, processor: P) -> Self;
}

/// A link that takes its input from outside the task graph.
pub trait IngressLinkBuilder<Packet>: LinkBuilder<(), Packet> {
    type Receiver;

    fn channel(self, receiver: Self::Receiver) -> Self;
}

/// A link that hands its output to something outside the task graph.
pub trait EgressLinkBuilder<Packet>: LinkBuilder<Packet, ()> {
    type Sender;

    fn channel(self, sender: Self::Sender) -> Self;
}
