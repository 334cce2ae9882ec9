use crate::channel::{Consumer, Producer, Stage};
use crate::config::AdapterConfig;
use crate::error::ConfigError;
use crate::word::{keep_mask, StreamWord};
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdapterState {
    Idle,
    /// Widening: some narrow beats are buffered.
    Filling,
    /// Narrowing: a wide word is being split into beats.
    Draining,
}

/// Reshapes a stream of `input_width` byte words into `output_width` byte words, keeping
/// byte order, the end-of-packet position and the keep bits of the final word. The wider
/// side must be a whole multiple of the narrower one.
pub struct WidthAdapter {
    input_width: usize,
    output_width: usize,
    /// Narrow words per wide word.
    ratio: usize,
    state: AdapterState,
    /// Widening: the wide word being assembled and how many beats it holds.
    /// Narrowing: the wide word being split and the next segment to emit.
    buffer: Option<StreamWord>,
    segment: usize,
    output: Option<StreamWord>,
}

impl WidthAdapter {
    pub fn new(config: &AdapterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let ratio = if config.input_width > config.output_width {
            config.input_width / config.output_width
        } else {
            config.output_width / config.input_width
        };
        Ok(WidthAdapter {
            input_width: config.input_width,
            output_width: config.output_width,
            ratio,
            state: AdapterState::Idle,
            buffer: None,
            segment: 0,
            output: None,
        })
    }

    pub fn with_widths(input_width: usize, output_width: usize) -> Result<Self, ConfigError> {
        WidthAdapter::new(&AdapterConfig::new(input_width, output_width))
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    fn widening(&self) -> bool {
        self.output_width > self.input_width
    }

    fn narrowing(&self) -> bool {
        self.output_width < self.input_width
    }

    pub fn ready(&self) -> bool {
        if self.narrowing() {
            self.buffer.is_none()
        } else {
            self.output.is_none()
        }
    }

    fn accept(&mut self, mut word: StreamWord) {
        word.poison_if_malformed("width adapter");
        if word.width() != self.input_width {
            word.data.resize(self.input_width, 0);
            word.keep &= keep_mask(self.input_width);
            word.poison();
        }

        if self.widening() {
            self.fill(word);
        } else if self.narrowing() {
            self.buffer = Some(word);
            self.segment = 0;
            self.state = AdapterState::Draining;
            self.drain();
        } else {
            self.output = Some(word);
        }
    }

    /// Places a narrow beat into the wide buffer, emitting it once full or at end of packet.
    fn fill(&mut self, beat: StreamWord) {
        let (input_width, output_width) = (self.input_width, self.output_width);
        let offset = self.segment * input_width;
        let wide = self.buffer.get_or_insert_with(|| StreamWord {
            data: vec![0; output_width],
            id: beat.id,
            dest: beat.dest,
            ..StreamWord::default()
        });
        wide.data[offset..offset + input_width].copy_from_slice(&beat.data);
        wide.keep |= (beat.keep & keep_mask(input_width)) << offset;
        wide.user |= beat.user;
        wide.last = beat.last;
        self.segment += 1;

        if beat.last || self.segment == self.ratio {
            trace!(beats = self.segment, last = beat.last, "wide word complete");
            self.output = self.buffer.take();
            self.segment = 0;
            self.state = AdapterState::Idle;
        } else {
            self.state = AdapterState::Filling;
        }
    }

    /// Closes a wide word that is still filling, as the end of a bad frame. Returns false if
    /// there was nothing buffered or the output register is occupied.
    pub fn abort_partial(&mut self) -> bool {
        if self.state != AdapterState::Filling || self.output.is_some() {
            return false;
        }
        let mut wide = match self.buffer.take() {
            Some(wide) => wide,
            None => return false,
        };
        trace!(beats = self.segment, "aborting partial wide word");
        wide.last = true;
        wide.poison();
        self.output = Some(wide);
        self.segment = 0;
        self.state = AdapterState::Idle;
        true
    }

    /// Moves the next segment of the wide buffer into the output register.
    fn drain(&mut self) {
        if self.output.is_some() {
            return;
        }
        let wide = match &self.buffer {
            Some(wide) => wide,
            None => return,
        };

        let i = self.segment;
        let width = self.output_width;
        let offset = i * width;
        let remaining = wide.keep.checked_shr(((i + 1) * width) as u32).unwrap_or(0);
        let last = wide.last && (i + 1 == self.ratio || remaining == 0);
        self.output = Some(StreamWord {
            data: wide.data[offset..offset + width].to_vec(),
            keep: (wide.keep >> offset) & keep_mask(width),
            last,
            id: wide.id,
            dest: wide.dest,
            user: wide.user,
        });

        if last || i + 1 == self.ratio {
            self.buffer = None;
            self.segment = 0;
            self.state = AdapterState::Idle;
        } else {
            self.segment += 1;
        }
    }
}

impl Consumer<StreamWord> for WidthAdapter {
    fn ready(&self) -> bool {
        WidthAdapter::ready(self)
    }

    fn push(&mut self, word: StreamWord) -> Result<(), StreamWord> {
        if !WidthAdapter::ready(self) {
            return Err(word);
        }
        self.accept(word);
        Ok(())
    }
}

impl Producer<StreamWord> for WidthAdapter {
    fn peek(&self) -> Option<&StreamWord> {
        self.output.as_ref()
    }

    fn pop(&mut self) -> Option<StreamWord> {
        let word = self.output.take();
        if word.is_some() && self.narrowing() {
            self.drain();
        }
        word
    }
}

impl Stage for WidthAdapter {
    fn tick(&mut self) {
        if self.narrowing() {
            self.drain();
        }
    }

    fn busy(&self) -> bool {
        self.state != AdapterState::Idle || self.output.is_some()
    }
}
