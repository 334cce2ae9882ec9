use crate::processor::Processor;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::trace;

/// Processor that logs every item flowing through it at `trace` level, tagged with the
/// name of the link it sits in.
pub struct Trace<A: Send + Clone + Debug> {
    name: &'static str,
    seen: u64,
    phantom: PhantomData<A>,
}

impl<A: Send + Clone + Debug> Trace<A> {
    pub fn new(name: &'static str) -> Trace<A> {
        Trace {
            name,
            seen: 0,
            phantom: PhantomData,
        }
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }
}

impl<A: Send + Clone + Debug> Processor for Trace<A> {
    type Input = A;
    type Output = A;

    fn process(&mut self, packet: Self::Input) -> Option<Self::Output> {
        trace!(link = self.name, seq = self.seen, ?packet);
        self.seen += 1;
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_forwards() {
        let mut tracer = Trace::new("test");
        let out: Vec<i32> = (0..10).filter_map(|p| tracer.process(p)).collect();
        assert_eq!(out, (0..10).collect::<Vec<_>>());
        assert_eq!(tracer.seen(), 10);
    }
}
