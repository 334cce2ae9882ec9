use crate::adapter::WidthAdapter;
use crate::channel::{Consumer, Producer, Stage};
use crate::config::AdapterConfig;
use crate::link::{Link, LinkBuilder, PacketStream};
use crate::word::StreamWord;
use futures::prelude::*;
use futures::ready;
use futures::task::{Context, Poll};
use std::pin::Pin;
use tracing::warn;

/// Runs a `WidthAdapter` inline on a word stream. Like `ProcessLink` it has no queue of its
/// own: the adapter's registers are the only storage, and input is pulled only when the
/// adapter can take another word.
#[derive(Default)]
pub struct AdapterLink {
    in_stream: Option<PacketStream<StreamWord>>,
    config: AdapterConfig,
}

impl AdapterLink {
    pub fn config(self, config: AdapterConfig) -> Self {
        AdapterLink {
            in_stream: self.in_stream,
            config,
        }
    }

    pub fn widths(self, input_width: usize, output_width: usize) -> Self {
        self.config(AdapterConfig::new(input_width, output_width))
    }
}

impl LinkBuilder<StreamWord, StreamWord> for AdapterLink {
    fn new() -> Self {
        AdapterLink {
            in_stream: None,
            config: AdapterConfig::default(),
        }
    }

    fn ingressors(self, mut in_streams: Vec<PacketStream<StreamWord>>) -> Self {
        assert_eq!(
            in_streams.len(),
            1,
            "AdapterLink may only take 1 input stream"
        );
        self.ingressor(in_streams.remove(0))
    }

    fn ingressor(self, in_stream: PacketStream<StreamWord>) -> Self {
        if self.in_stream.is_some() {
            panic!("AdapterLink may only take 1 input stream")
        }

        AdapterLink {
            in_stream: Some(in_stream),
            config: self.config,
        }
    }

    fn build_link(self) -> Link<StreamWord> {
        let in_stream = match self.in_stream {
            None => panic!("Cannot build link! Missing input stream"),
            Some(in_stream) => in_stream,
        };
        let adapter = match WidthAdapter::new(&self.config) {
            Ok(adapter) => adapter,
            Err(e) => panic!("Cannot build link! {}", e),
        };

        (
            vec![],
            vec![Box::new(AdapterRunner {
                in_stream,
                adapter,
                open_frame: false,
                finished: false,
            })],
        )
    }
}

struct AdapterRunner {
    in_stream: PacketStream<StreamWord>,
    adapter: WidthAdapter,
    /// The last word taken from the input did not end its frame.
    open_frame: bool,
    finished: bool,
}

impl AdapterRunner {
    /// One byte flagged bad with `last` set, closing a frame whose beats are already out.
    fn abort_marker(&self) -> StreamWord {
        StreamWord::new(vec![0; self.adapter.output_width()], 0b1, true).with_user(true)
    }
}

impl Stream for AdapterRunner {
    type Item = StreamWord;

    /// Hands out a finished output word if there is one, otherwise feeds the adapter from the
    /// input. If the input ends inside a frame, the frame is closed with the user bit set.
    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(word) = self.adapter.pop() {
                return Poll::Ready(Some(word));
            }
            self.adapter.tick();
            if self.adapter.peek().is_some() {
                continue;
            }

            if self.finished {
                if !self.open_frame {
                    return Poll::Ready(None);
                }
                warn!(
                    state = ?self.adapter.state(),
                    "input ended inside a frame, closing it as bad"
                );
                self.open_frame = false;
                if self.adapter.abort_partial() {
                    continue;
                }
                return Poll::Ready(Some(self.abort_marker()));
            }

            match ready!(Pin::new(&mut self.in_stream).poll_next(cx)) {
                None => self.finished = true,
                Some(word) => {
                    self.open_frame = !word.last;
                    self.adapter
                        .push(word)
                        .expect("AdapterLink::poll_next: push to an empty adapter shouldn't fail")
                }
            }
        }
    }
}
