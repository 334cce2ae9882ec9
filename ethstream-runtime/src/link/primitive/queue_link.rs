use crate::link::utils::feeder::QueueFeeder;
use crate::link::utils::task_park::*;
use crate::link::{Link, LinkBuilder, PacketStream, ProcessLinkBuilder};
use crate::processor::Processor;
use crossbeam::crossbeam_channel::{self, Receiver, TryRecvError};
use futures::prelude::*;
use futures::task::{Context, Poll};
use std::pin::Pin;

/// Moves a stage onto its own task. The stage runs on the writing side, right before its
/// output is queued, and the queue is the elastic buffer between this task and whatever reads
/// the egress stream. A full queue puts the writer to sleep, an empty one the reader.
#[derive(Default)]
pub struct QueueLink<P: Processor> {
    in_stream: Option<PacketStream<P::Input>>,
    processor: Option<P>,
    queue_capacity: usize,
}

impl<P: Processor> QueueLink<P> {
    /// Items the queue holds before the writing task parks, 10 unless changed.
    pub fn queue_capacity(self, queue_capacity: usize) -> Self {
        assert!(
            queue_capacity > 0,
            "QueueLink needs room for at least one item, got capacity {}",
            queue_capacity
        );
        QueueLink {
            queue_capacity,
            ..self
        }
    }
}

impl<P: Processor + Send + 'static> LinkBuilder<P::Input, P::Output> for QueueLink<P> {
    fn new() -> Self {
        QueueLink {
            in_stream: None,
            processor: None,
            queue_capacity: 10,
        }
    }

    fn ingressors(self, in_streams: Vec<PacketStream<P::Input>>) -> Self {
        let mut in_streams = in_streams.into_iter();
        match (in_streams.next(), in_streams.next()) {
            (Some(in_stream), None) => self.ingressor(in_stream),
            _ => panic!("QueueLink reads exactly one stream"),
        }
    }

    fn ingressor(self, in_stream: PacketStream<P::Input>) -> Self {
        assert!(self.in_stream.is_none(), "QueueLink reads exactly one stream");
        QueueLink {
            in_stream: Some(in_stream),
            ..self
        }
    }

    fn build_link(self) -> Link<P::Output> {
        let in_stream = match self.in_stream {
            Some(in_stream) => in_stream,
            None => panic!("Cannot build link! Missing input stream"),
        };
        let mut processor = match self.processor {
            Some(processor) => processor,
            None => panic!("Cannot build link! Missing processor"),
        };

        let (sender, receiver) = crossbeam_channel::bounded(self.queue_capacity);
        let park = new_task_park();
        let feeder = QueueFeeder::new(in_stream, sender, park.clone(), move |item| {
            processor.process(item)
        });
        let drain = QueueDrain::new(receiver, park);

        (vec![Box::new(feeder)], vec![Box::new(drain)])
    }
}

impl<P: Processor + Send + 'static> ProcessLinkBuilder<P> for QueueLink<P> {
    fn processor(self, processor: P) -> Self {
        QueueLink {
            processor: Some(processor),
            ..self
        }
    }
}

/// The reading half of a queue, as a stream.
pub struct QueueDrain<Item> {
    queue: Receiver<Option<Item>>,
    park: TaskPark,
}

impl<Item> QueueDrain<Item> {
    pub fn new(queue: Receiver<Option<Item>>, park: TaskPark) -> Self {
        QueueDrain { queue, park }
    }
}

impl<Item> Unpin for QueueDrain<Item> {}

impl<Item> Stream for QueueDrain<Item> {
    type Item = Item;

    /// Every item taken frees a slot, so the writer is woken in case it sleeps on a full
    /// queue. The stream ends on the writer's `None` or when the writer is dropped.
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Item>> {
        let received = self.queue.try_recv();
        match received {
            Ok(Some(item)) => {
                unpark_and_wake(&self.park);
                Poll::Ready(Some(item))
            }
            Ok(None) | Err(TryRecvError::Disconnected) => {
                die_and_wake(&self.park);
                Poll::Ready(None)
            }
            Err(TryRecvError::Empty) => {
                park_and_wake(&self.park, cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
