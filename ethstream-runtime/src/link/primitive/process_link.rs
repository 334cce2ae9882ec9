use crate::link::{Link, LinkBuilder, PacketStream, ProcessLinkBuilder};
use crate::processor::Processor;
use futures::prelude::*;
use futures::task::{Context, Poll};
use std::pin::Pin;

/// Applies a `Processor` to a stream in place. No queue and no task of its own: the stage
/// runs on whichever task polls its egress stream, one pull upstream per pull downstream.
/// Exactly one input and one output, since there is nowhere to merge or split.
#[derive(Default)]
pub struct ProcessLink<P: Processor> {
    in_stream: Option<PacketStream<P::Input>>,
    processor: Option<P>,
}

impl<P: Processor + Send + 'static> LinkBuilder<P::Input, P::Output> for ProcessLink<P> {
    fn new() -> Self {
        ProcessLink {
            in_stream: None,
            processor: None,
        }
    }

    fn ingressors(self, in_streams: Vec<PacketStream<P::Input>>) -> Self {
        let mut in_streams = in_streams.into_iter();
        match (in_streams.next(), in_streams.next()) {
            (Some(in_stream), None) => self.ingressor(in_stream),
            _ => panic!("ProcessLink reads exactly one stream"),
        }
    }

    fn ingressor(self, in_stream: PacketStream<P::Input>) -> Self {
        assert!(self.in_stream.is_none(), "ProcessLink reads exactly one stream");
        ProcessLink {
            in_stream: Some(in_stream),
            ..self
        }
    }

    fn build_link(self) -> Link<P::Output> {
        let in_stream = match self.in_stream {
            Some(in_stream) => in_stream,
            None => panic!("Cannot build link! Missing input streams"),
        };
        let processor = match self.processor {
            Some(processor) => processor,
            None => panic!("Cannot build link! Missing processor"),
        };
        (vec![], vec![Box::new(Processed { in_stream, processor })])
    }
}

impl<P: Processor + Send + 'static> ProcessLinkBuilder<P> for ProcessLink<P> {
    fn processor(self, processor: P) -> Self {
        ProcessLink {
            processor: Some(processor),
            ..self
        }
    }
}

struct Processed<P: Processor> {
    in_stream: PacketStream<P::Input>,
    processor: P,
}

impl<P: Processor> Unpin for Processed<P> {}

impl<P: Processor> Stream for Processed<P> {
    type Item = P::Output;

    /// Items the processor drops are skipped over within the same poll. A pending input has
    /// our waker, and the end of the input ends this stream too.
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<P::Output>> {
        let stage = &mut *self;
        while let Some(item) = futures::ready!(stage.in_stream.poll_next_unpin(cx)) {
            if let Some(out) = stage.processor.process(item) {
                return Poll::Ready(Some(out));
            }
        }
        Poll::Ready(None)
    }
}
