use crate::channel::{Consumer, Producer, Stage};
use crate::word::StreamWord;
use ethstream_packets::ArpFrame;
use std::collections::VecDeque;

/// Turns whole ARP frames into a byte-wide word stream. Takes the next frame once the
/// previous one has fully left.
#[derive(Default)]
pub struct FrameSerializer {
    bytes: VecDeque<u8>,
    output: Option<StreamWord>,
    frames: u64,
}

impl FrameSerializer {
    pub fn new() -> Self {
        FrameSerializer::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn refill(&mut self) {
        if self.output.is_some() {
            return;
        }
        if let Some(byte) = self.bytes.pop_front() {
            self.output = Some(StreamWord::full(vec![byte], self.bytes.is_empty()));
        }
    }
}

impl Consumer<ArpFrame> for FrameSerializer {
    fn ready(&self) -> bool {
        self.bytes.is_empty() && self.output.is_none()
    }

    fn push(&mut self, frame: ArpFrame) -> Result<(), ArpFrame> {
        if !self.ready() {
            return Err(frame);
        }
        self.bytes.extend(frame.frame().into_bytes());
        self.frames += 1;
        self.refill();
        Ok(())
    }
}

impl Producer<StreamWord> for FrameSerializer {
    fn peek(&self) -> Option<&StreamWord> {
        self.output.as_ref()
    }

    fn pop(&mut self) -> Option<StreamWord> {
        let word = self.output.take();
        self.refill();
        word
    }
}

impl Stage for FrameSerializer {
    fn tick(&mut self) {
        self.refill();
    }

    fn busy(&self) -> bool {
        !self.bytes.is_empty() || self.output.is_some()
    }
}
