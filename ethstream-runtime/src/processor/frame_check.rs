use crate::processor::Processor;
use crate::word::{StreamWord, WordCheck};

/// Poisons words whose keep mask is malformed, and checks that every word has the expected
/// width. Nothing is dropped or repaired.
pub struct FrameCheck {
    width: usize,
    poisoned: u64,
}

impl FrameCheck {
    pub fn new(width: usize) -> Self {
        FrameCheck { width, poisoned: 0 }
    }

    /// Words poisoned so far.
    pub fn poisoned(&self) -> u64 {
        self.poisoned
    }
}

impl Processor for FrameCheck {
    type Input = StreamWord;
    type Output = StreamWord;

    fn process(&mut self, mut word: StreamWord) -> Option<StreamWord> {
        let mut bad = word.poison_if_malformed("frame check") != WordCheck::Ok;
        if !bad && word.width() != self.width {
            word.poison();
            bad = true;
        }
        if bad {
            self.poisoned += 1;
        }
        Some(word)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisons_only_bad_words() {
        let mut check = FrameCheck::new(4);
        let good = StreamWord::full(vec![1, 2, 3, 4], false);
        let tail = StreamWord::new(vec![5, 0, 0, 0], 0b0001, true);
        let gap = StreamWord::new(vec![1, 2, 3, 4], 0b0101, true);
        let short = StreamWord::full(vec![1, 2], true);

        assert_eq!(check.process(good.clone()), Some(good));
        assert_eq!(check.process(tail.clone()), Some(tail));
        assert!(check.process(gap).unwrap().user);
        assert!(check.process(short).unwrap().user);
        assert_eq!(check.poisoned(), 2);
    }

    #[test]
    fn already_flagged_words_are_not_counted() {
        let mut check = FrameCheck::new(1);
        let flagged = StreamWord::full(vec![1], true).with_user(true);
        assert_eq!(check.process(flagged.clone()), Some(flagged));
        assert_eq!(check.poisoned(), 0);
    }
}
