//! The valid/ready handshake shared by every synchronous stage.
//!
//! A `Producer` exposes the item it is offering through `peek` and must keep offering that
//! same item until it is taken with `pop`. A `Consumer` says whether it would accept an item
//! this step through `ready`. An item moves only when both hold in the same step, and the
//! edge itself never stores anything.

use tracing::trace;

pub trait Producer<T> {
    /// The item on offer, if any. Repeated calls return the same item until `pop`.
    fn peek(&self) -> Option<&T>;

    fn pop(&mut self) -> Option<T>;
}

pub trait Consumer<T> {
    fn ready(&self) -> bool;

    /// Offers an item. A consumer that is not ready hands it back.
    fn push(&mut self, item: T) -> Result<(), T>;
}

/// A unit of work for the cooperative scheduler. `tick` advances internal state by one
/// step; transfers between stages happen outside of it.
pub trait Stage {
    fn tick(&mut self);

    /// True while the stage holds state that still has to move somewhere.
    fn busy(&self) -> bool;
}

/// Moves one item from `src` to `dst` iff `src` has one on offer and `dst` is ready.
pub fn transfer<T, P, C>(src: &mut P, dst: &mut C) -> bool
where
    P: Producer<T> + ?Sized,
    C: Consumer<T> + ?Sized,
{
    if src.peek().is_none() || !dst.ready() {
        return false;
    }
    match src.pop() {
        Some(item) => {
            if dst.push(item).is_err() {
                panic!("transfer: consumer refused an item after signalling ready");
            }
            true
        }
        None => false,
    }
}

/// A named edge between two stages. Counts what happened on each step it is driven.
#[derive(Debug, Clone, Default)]
pub struct StreamChannel {
    name: &'static str,
    transfers: u64,
    stalls: u64,
}

impl StreamChannel {
    pub fn new(name: &'static str) -> Self {
        StreamChannel {
            name,
            transfers: 0,
            stalls: 0,
        }
    }

    /// Drives one step of the handshake. A stall is a step where data was on offer but the
    /// consumer was not ready.
    pub fn step<T, P, C>(&mut self, src: &mut P, dst: &mut C) -> bool
    where
        P: Producer<T> + ?Sized,
        C: Consumer<T> + ?Sized,
    {
        if transfer(src, dst) {
            self.transfers += 1;
            true
        } else {
            if src.peek().is_some() {
                self.stalls += 1;
                trace!(channel = self.name, "stall");
            }
            false
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    pub fn stalls(&self) -> u64 {
        self.stalls
    }
}

/// Inputs of a stage that takes more than one stream of the same item type.
pub trait Ports<T> {
    fn port_ready(&self, port: usize) -> bool;

    fn port_push(&mut self, port: usize, item: T) -> Result<(), T>;
}

/// One input of a multi-input stage, usable anywhere a `Consumer` is.
pub struct Port<'a, S: ?Sized> {
    stage: &'a mut S,
    index: usize,
}

impl<'a, S: ?Sized> Port<'a, S> {
    pub fn new(stage: &'a mut S, index: usize) -> Self {
        Port { stage, index }
    }
}

impl<'a, T, S: Ports<T> + ?Sized> Consumer<T> for Port<'a, S> {
    fn ready(&self) -> bool {
        self.stage.port_ready(self.index)
    }

    fn push(&mut self, item: T) -> Result<(), T> {
        self.stage.port_push(self.index, item)
    }
}
