/// Task Park is where a task leaves its waker before sleeping, and where it finds the wakers
/// of tasks it has to wake. Both sides of a `QueueLink` and every port of a `JoinLink` meet
/// through one: a side that hits a full or empty channel parks itself there and trusts the
/// other side to wake it once the blocker clears. A park is marked dead when one side goes
/// away so the other never sleeps waiting on it.
pub mod task_park;

/// The writing half shared by every queue that crosses a task boundary.
pub mod feeder;
