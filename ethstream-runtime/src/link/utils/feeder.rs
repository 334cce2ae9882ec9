use super::task_park::*;
use crate::link::PacketStream;
use crossbeam::crossbeam_channel::Sender;
use futures::prelude::*;
use futures::ready;
use futures::task::{Context, Poll};
use std::pin::Pin;

/// The writing half of a queue between two tasks. Pulls from `input`, passes every item
/// through `step` and sends what comes out. The queue carries `Option`s so the end of
/// `input` reaches the reader as a `None`.
pub struct QueueFeeder<In, Out, F> {
    input: PacketStream<In>,
    queue: Sender<Option<Out>>,
    park: TaskPark,
    step: F,
}

impl<In, Out, F> QueueFeeder<In, Out, F>
where
    F: FnMut(In) -> Option<Out>,
{
    pub fn new(
        input: PacketStream<In>,
        queue: Sender<Option<Out>>,
        park: TaskPark,
        step: F,
    ) -> Self {
        QueueFeeder {
            input,
            queue,
            park,
            step,
        }
    }
}

impl<In, Out, F> Unpin for QueueFeeder<In, Out, F> {}

impl<In, Out, F> Future for QueueFeeder<In, Out, F>
where
    F: FnMut(In) -> Option<Out>,
{
    type Output = ();

    /// Runs until the queue fills or the input stalls. The reader wakes us through the park
    /// each time it frees a slot. A reader that has gone away ends the feeder.
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let feeder = &mut *self;
        loop {
            // Only this task sends, so room seen here is still there at `try_send`.
            if feeder.queue.is_full() {
                if park_and_wake(&feeder.park, cx.waker().clone()) {
                    return Poll::Pending;
                }
                // Dead park on a full queue: the reader is gone and will never make room.
                return Poll::Ready(());
            }

            let item = match ready!(feeder.input.poll_next_unpin(cx)) {
                Some(item) => item,
                None => {
                    let _ = feeder.queue.try_send(None);
                    die_and_wake(&feeder.park);
                    return Poll::Ready(());
                }
            };
            if let Some(out) = (feeder.step)(item) {
                if feeder.queue.try_send(Some(out)).is_err() {
                    die_and_wake(&feeder.park);
                    return Poll::Ready(());
                }
                unpark_and_wake(&feeder.park);
            }
        }
    }
}
