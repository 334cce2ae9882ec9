use crate::processor::Processor;
use std::marker::PhantomData;

/// Processor that passes what it receives.
#[derive(Default)]
pub struct Identity<A: Send + Clone> {
    phantom: PhantomData<A>,
}

impl<A: Send + Clone> Identity<A> {
    pub fn new() -> Identity<A> {
        Identity {
            phantom: PhantomData,
        }
    }
}

impl<A: Send + Clone> Processor for Identity<A> {
    type Input = A;
    type Output = A;

    fn process(&mut self, packet: Self::Input) -> Option<Self::Output> {
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::StreamWord;

    #[test]
    fn passes_words_untouched() {
        let mut identity = Identity::new();
        let word = StreamWord::new(vec![1, 2, 0, 0], 0b0011, true).with_user(true);
        assert_eq!(identity.process(word.clone()), Some(word));
    }
}
