//! Waker handoff between the two sides of a channel.
//!
//! A task that cannot make progress (its outgoing channel is full, or its incoming channel is
//! empty) parks its waker here and returns `Poll::Pending`. The task on the other side of the
//! channel wakes whatever it finds parked once it has cleared the blocker. A side that is
//! going away marks the park dead, so the survivor wakes itself instead of sleeping forever.

use crossbeam::atomic::AtomicCell;
use futures::task::Waker;
use std::sync::Arc;

/// What is currently parked.
///
/// `IndirectParked` holds a shared slot rather than a waker. A task waiting on several
/// channels at once (the egressor of a `JoinLink`) leaves the same slot in every park; the
/// first side to take the waker out of the slot wakes it, and the rest find `None`, so the
/// task is woken once.
pub enum TaskParkState {
    Dead,
    Empty,
    Parked(Waker),
    IndirectParked(WakerSlot),
}

/// A park shared by the two sides of one channel.
pub type TaskPark = Arc<AtomicCell<TaskParkState>>;

/// A waker a task leaves in more than one park at a time.
pub type WakerSlot = Arc<AtomicCell<Option<Waker>>>;

/// An empty park, ready to hand one clone to each side of a channel.
pub fn new_task_park() -> TaskPark {
    Arc::new(AtomicCell::new(TaskParkState::Empty))
}

/// Stores `swap`, waking whatever was parked. Returns false if the park was dead, in which
/// case it stays dead.
fn swap_and_wake(park: &TaskPark, swap: TaskParkState) -> bool {
    match park.swap(swap) {
        TaskParkState::Dead => {
            park.store(TaskParkState::Dead);
            false
        }
        TaskParkState::Empty => true,
        TaskParkState::Parked(waker) => {
            waker.wake();
            true
        }
        TaskParkState::IndirectParked(slot) => {
            if let Some(waker) = slot.swap(None) {
                waker.wake();
            }
            true
        }
    }
}

/// Wakes the parked task, if any, without parking the caller.
pub fn unpark_and_wake(park: &TaskPark) {
    swap_and_wake(park, TaskParkState::Empty);
}

/// Wakes the parked task, if any, and parks the caller. A caller that finds the park dead is
/// woken straight away and gets false back.
pub fn park_and_wake(park: &TaskPark, waker: Waker) -> bool {
    let parked = swap_and_wake(park, TaskParkState::Parked(waker.clone()));
    if !parked {
        waker.wake();
    }
    parked
}

/// Like `park_and_wake`, but parks a shared slot. Returns false if the park was dead.
pub fn indirect_park_and_wake(park: &TaskPark, slot: WakerSlot) -> bool {
    swap_and_wake(park, TaskParkState::IndirectParked(slot))
}

/// Wakes the parked task, if any, and marks the park dead.
pub fn die_and_wake(park: &TaskPark) {
    swap_and_wake(park, TaskParkState::Dead);
}
