//! Per-item transformations run inside `ProcessLink` and `QueueLink`.

mod identity;
pub use self::identity::*;

mod trace;
pub use self::trace::*;

mod frame_check;
pub use self::frame_check::*;

/// A stateful function over the items of one stream. Returning `None` drops the item.
pub trait Processor {
    type Input: Send + Clone;
    type Output: Send + Clone;

    fn process(&mut self, packet: Self::Input) -> Option<Self::Output>;
}
