use tracing::warn;

/// Widest word any stage handles, bounded by the 64 bit keep mask.
pub const MAX_WIDTH: usize = 64;

/// Anything that travels as part of a frame. Queues and joins use this to find frame
/// boundaries without knowing what the items are.
pub trait Framed {
    /// Final item of its frame.
    fn is_last(&self) -> bool;

    /// Frame has been flagged as bad by an upstream stage.
    fn is_bad(&self) -> bool;
}

/// One beat on a stream: up to 64 bytes, a keep bit per byte, end of packet, and the
/// side-channel tags that ride along with the data.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StreamWord {
    pub data: Vec<u8>,
    /// Bit `i` set means `data[i]` is meaningful.
    pub keep: u64,
    pub last: bool,
    pub id: u8,
    pub dest: u8,
    /// Frame error flag. Stages forward it untouched and set it to poison a frame.
    pub user: bool,
}

/// Result of checking a word's keep mask against its width and end-of-packet flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WordCheck {
    Ok,
    /// No byte is marked valid.
    Empty,
    /// Keep has a cleared bit below a set one.
    InternalGap,
    /// Non-final word with trailing invalid bytes.
    PartialNotLast,
    /// Keep marks bytes beyond the end of `data`.
    KeepOutOfRange,
}

/// Keep mask with the low `n` bits set.
pub fn keep_mask(n: usize) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

impl StreamWord {
    pub fn new(data: Vec<u8>, keep: u64, last: bool) -> Self {
        StreamWord {
            data,
            keep,
            last,
            ..StreamWord::default()
        }
    }

    /// Word with every byte valid.
    pub fn full(data: Vec<u8>, last: bool) -> Self {
        let keep = keep_mask(data.len());
        StreamWord::new(data, keep, last)
    }

    pub fn with_id(self, id: u8) -> Self {
        StreamWord { id, ..self }
    }

    pub fn with_dest(self, dest: u8) -> Self {
        StreamWord { dest, ..self }
    }

    pub fn with_user(self, user: bool) -> Self {
        StreamWord { user, ..self }
    }

    pub fn width(&self) -> usize {
        self.data.len()
    }

    pub fn valid_len(&self) -> usize {
        (self.keep & keep_mask(self.width())).count_ones() as usize
    }

    /// The meaningful bytes, in order.
    pub fn bytes(&self) -> Vec<u8> {
        self.data
            .iter()
            .enumerate()
            .filter(|(i, _)| self.keep & (1u64 << i) != 0)
            .map(|(_, byte)| *byte)
            .collect()
    }

    pub fn check(&self) -> WordCheck {
        let full = keep_mask(self.width());
        if self.keep & !full != 0 {
            WordCheck::KeepOutOfRange
        } else if self.keep == 0 {
            WordCheck::Empty
        } else if self.keep & self.keep.wrapping_add(1) != 0 {
            WordCheck::InternalGap
        } else if !self.last && self.keep != full {
            WordCheck::PartialNotLast
        } else {
            WordCheck::Ok
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.check() != WordCheck::Ok
    }

    pub fn poison(&mut self) {
        self.user = true;
    }

    /// Poisons the word if its keep mask is malformed. Returns what the check found.
    pub fn poison_if_malformed(&mut self, stage: &'static str) -> WordCheck {
        let check = self.check();
        if check != WordCheck::Ok {
            warn!(stage, ?check, keep = self.keep, last = self.last, "poisoning malformed word");
            self.poison();
        }
        check
    }
}

impl Framed for StreamWord {
    fn is_last(&self) -> bool {
        self.last
    }

    fn is_bad(&self) -> bool {
        self.user
    }
}

/// Splits a frame into `width` byte words. Only the final word may be partial; its unused
/// bytes are zero. An empty frame has no words.
pub fn packetize(frame: &[u8], width: usize) -> Vec<StreamWord> {
    assert!(
        (1..=MAX_WIDTH).contains(&width),
        "word width {} must be in range 1..=64",
        width
    );
    let count = (frame.len() + width - 1) / width;
    frame
        .chunks(width)
        .enumerate()
        .map(|(i, chunk)| {
            let mut data = chunk.to_vec();
            data.resize(width, 0);
            StreamWord::new(data, keep_mask(chunk.len()), i + 1 == count)
        })
        .collect()
}

/// Concatenates the meaningful bytes of `words`.
pub fn depacketize<'a, I: IntoIterator<Item = &'a StreamWord>>(words: I) -> Vec<u8> {
    words.into_iter().flat_map(StreamWord::bytes).collect()
}

/// Groups a word sequence into frames at each `last`. A trailing unfinished frame is dropped.
pub fn frames<I: IntoIterator<Item = StreamWord>>(words: I) -> Vec<Vec<StreamWord>> {
    let mut frames = vec![];
    let mut current = vec![];
    for word in words {
        let last = word.last;
        current.push(word);
        if last {
            frames.push(std::mem::replace(&mut current, vec![]));
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_masks() {
        assert_eq!(keep_mask(0), 0);
        assert_eq!(keep_mask(1), 0x1);
        assert_eq!(keep_mask(8), 0xff);
        assert_eq!(keep_mask(64), u64::MAX);
    }

    #[test]
    fn check_keep_shapes() {
        let word = |keep, last| StreamWord::new(vec![0; 4], keep, last);
        assert_eq!(word(0b1111, false).check(), WordCheck::Ok);
        assert_eq!(word(0b0011, true).check(), WordCheck::Ok);
        assert_eq!(word(0b0011, false).check(), WordCheck::PartialNotLast);
        assert_eq!(word(0b1011, true).check(), WordCheck::InternalGap);
        assert_eq!(word(0b0110, true).check(), WordCheck::InternalGap);
        assert_eq!(word(0, true).check(), WordCheck::Empty);
        assert_eq!(word(0b1_0000, true).check(), WordCheck::KeepOutOfRange);

        let wide = StreamWord::full(vec![0; 64], false);
        assert_eq!(wide.check(), WordCheck::Ok);
        assert_eq!(wide.valid_len(), 64);
    }

    #[test]
    fn malformed_words_are_poisoned() {
        let mut word = StreamWord::new(vec![1, 2, 3, 4], 0b0101, true);
        assert_eq!(word.poison_if_malformed("test"), WordCheck::InternalGap);
        assert!(word.is_bad());

        let mut word = StreamWord::full(vec![1, 2], true);
        assert_eq!(word.poison_if_malformed("test"), WordCheck::Ok);
        assert!(!word.is_bad());
    }

    #[test]
    fn packetize_pads_final_word() {
        let words = packetize(&[1, 2, 3, 4, 5], 4);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0], StreamWord::full(vec![1, 2, 3, 4], false));
        assert_eq!(words[1], StreamWord::new(vec![5, 0, 0, 0], 0b1, true));
        assert_eq!(depacketize(&words), vec![1, 2, 3, 4, 5]);

        assert!(packetize(&[], 8).is_empty());
        assert_eq!(packetize(&[9], 1), vec![StreamWord::full(vec![9], true)]);
    }

    #[test]
    fn frames_split_on_last() {
        let mut words = packetize(&[1, 2, 3], 2);
        words.extend(packetize(&[4], 2));
        words.push(StreamWord::full(vec![5, 6], false));
        let frames = frames(words);
        assert_eq!(frames.len(), 2);
        assert_eq!(depacketize(&frames[0]), vec![1, 2, 3]);
        assert_eq!(depacketize(&frames[1]), vec![4]);
    }
}
