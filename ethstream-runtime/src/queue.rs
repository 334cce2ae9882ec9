use crate::channel::{Consumer, Producer};
use crate::word::Framed;
use ethstream_packets::{ArpFrame, HeaderRecord};
use tracing::debug;

/// Fixed-capacity FIFO over a ring of slots.
///
/// In frame mode the items of a frame stay invisible to the consumer until its last item
/// arrives. A frame whose last item is flagged bad is rolled back, and a frame that fills
/// the whole ring is discarded, since it could never be committed.
pub struct BoundedQueue<T> {
    slots: Vec<Option<T>>,
    /// Next slot to pop.
    head: usize,
    /// Next slot to push.
    tail: usize,
    /// Items visible to the consumer.
    committed: usize,
    /// Items of the frame being received, frame mode only.
    pending: usize,
    drop_bad_frame: bool,
    discarding: bool,
    dropped_frames: u64,
    overflowed_frames: u64,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be non-zero");
        BoundedQueue {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            committed: 0,
            pending: 0,
            drop_bad_frame: false,
            discarding: false,
            dropped_frames: 0,
            overflowed_frames: 0,
        }
    }

    /// Queue that only releases whole frames and drops frames flagged bad.
    pub fn frame_mode(capacity: usize) -> Self {
        BoundedQueue {
            drop_bad_frame: true,
            ..BoundedQueue::new(capacity)
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Items the consumer can see.
    pub fn len(&self) -> usize {
        self.committed
    }

    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    pub fn is_full(&self) -> bool {
        self.committed + self.pending == self.capacity()
    }

    /// Items of a frame that has not been committed yet.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.committed - self.pending
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn overflowed_frames(&self) -> u64 {
        self.overflowed_frames
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.head = 0;
        self.tail = 0;
        self.committed = 0;
        self.pending = 0;
        self.discarding = false;
    }

    fn write(&mut self, item: T) {
        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.capacity();
    }

    fn rollback(&mut self) {
        let capacity = self.capacity();
        for _ in 0..self.pending {
            self.tail = (self.tail + capacity - 1) % capacity;
            self.slots[self.tail] = None;
        }
        self.pending = 0;
    }
}

impl<T: Framed> BoundedQueue<T> {
    fn push_framed(&mut self, item: T) -> Result<(), T> {
        if self.discarding {
            if item.is_last() {
                self.discarding = false;
            }
            return Ok(());
        }

        if self.is_full() {
            if self.pending < self.capacity() {
                return Err(item);
            }
            debug!(
                capacity = self.capacity(),
                "frame larger than queue, discarding"
            );
            self.rollback();
            self.overflowed_frames += 1;
            self.discarding = !item.is_last();
            return Ok(());
        }

        let last = item.is_last();
        let bad = item.is_bad();
        self.write(item);
        self.pending += 1;
        if last {
            if bad {
                debug!(words = self.pending, "dropping bad frame");
                self.rollback();
                self.dropped_frames += 1;
            } else {
                self.committed += self.pending;
                self.pending = 0;
            }
        }
        Ok(())
    }
}

impl<T> Producer<T> for BoundedQueue<T> {
    fn peek(&self) -> Option<&T> {
        if self.committed == 0 {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    fn pop(&mut self) -> Option<T> {
        if self.committed == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.committed -= 1;
        item
    }
}

impl<T: Framed> Consumer<T> for BoundedQueue<T> {
    fn ready(&self) -> bool {
        !self.is_full() || (self.drop_bad_frame && (self.discarding || self.pending == self.capacity()))
    }

    fn push(&mut self, item: T) -> Result<(), T> {
        if self.drop_bad_frame {
            return self.push_framed(item);
        }
        if self.is_full() {
            return Err(item);
        }
        self.write(item);
        self.committed += 1;
        Ok(())
    }
}

/// A header describes a whole datagram.
impl Framed for HeaderRecord {
    fn is_last(&self) -> bool {
        true
    }

    fn is_bad(&self) -> bool {
        false
    }
}

impl Framed for ArpFrame {
    fn is_last(&self) -> bool {
        true
    }

    fn is_bad(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::StreamWord;

    fn word(byte: u8, last: bool) -> StreamWord {
        StreamWord::full(vec![byte], last)
    }

    fn push_all(queue: &mut BoundedQueue<StreamWord>, words: Vec<StreamWord>) {
        for w in words {
            assert!(queue.ready());
            assert_eq!(queue.push(w), Ok(()));
        }
    }

    #[test]
    fn fifo_order_and_wraparound() {
        let mut queue = BoundedQueue::new(3);
        for round in 0..4u8 {
            push_all(&mut queue, vec![word(round, false), word(round + 10, true)]);
            assert_eq!(queue.len(), 2);
            assert_eq!(queue.pop().map(|w| w.data[0]), Some(round));
            assert_eq!(queue.peek().map(|w| w.data[0]), Some(round + 10));
            assert_eq!(queue.pop().map(|w| w.data[0]), Some(round + 10));
            assert!(queue.is_empty());
        }
    }

    #[test]
    fn full_queue_hands_item_back() {
        let mut queue = BoundedQueue::new(2);
        push_all(&mut queue, vec![word(1, false), word(2, false)]);
        assert!(queue.is_full());
        assert!(!queue.ready());
        assert_eq!(queue.push(word(3, true)), Err(word(3, true)));
        queue.pop();
        assert_eq!(queue.push(word(3, true)), Ok(()));
    }

    #[test]
    fn frame_mode_hides_partial_frames() {
        let mut queue = BoundedQueue::frame_mode(8);
        push_all(&mut queue, vec![word(1, false), word(2, false)]);
        assert!(queue.is_empty());
        assert_eq!(queue.peek(), None);

        push_all(&mut queue, vec![word(3, true)]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(word(1, false)));
    }

    #[test]
    fn frame_mode_rolls_back_bad_frames() {
        let mut queue = BoundedQueue::frame_mode(8);
        push_all(&mut queue, vec![word(1, true)]);
        push_all(
            &mut queue,
            vec![word(2, false), word(3, true).with_user(true)],
        );
        push_all(&mut queue, vec![word(4, true)]);

        assert_eq!(queue.dropped_frames(), 1);
        assert_eq!(queue.pop(), Some(word(1, true)));
        assert_eq!(queue.pop(), Some(word(4, true)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn frame_mode_discards_frames_that_cannot_fit() {
        let mut queue = BoundedQueue::frame_mode(3);
        push_all(
            &mut queue,
            (0..6).map(|i| word(i, i == 5)).collect::<Vec<_>>(),
        );
        assert_eq!(queue.overflowed_frames(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.free(), 3);

        push_all(&mut queue, vec![word(9, false), word(10, true)]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn frame_mode_stalls_while_committed_data_drains() {
        let mut queue = BoundedQueue::frame_mode(3);
        push_all(&mut queue, vec![word(1, true), word(2, false), word(3, false)]);
        assert!(!queue.ready());
        assert_eq!(queue.pop(), Some(word(1, true)));
        push_all(&mut queue, vec![word(4, true)]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn clear_resets_everything() {
        let mut queue = BoundedQueue::frame_mode(4);
        push_all(&mut queue, vec![word(1, true), word(2, false)]);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.free(), 4);
        push_all(&mut queue, vec![word(3, true)]);
        assert_eq!(queue.pop(), Some(word(3, true)));
    }
}
