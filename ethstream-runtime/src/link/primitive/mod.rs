/// Pull based and storage free: a word is fetched from the input only when one is requested
/// from the output, and leaves straight away unless the processor swallows it. Both sides run
/// on the same task.
mod process_link;
pub use self::process_link::*;

/// Words are processed into a bounded channel and pulled from it by another task. This is the
/// elastic buffer of the runtime and the place to put a task boundary.
mod queue_link;
pub use self::queue_link::*;

/// Merges several framed streams into one, a whole frame at a time, round robin.
mod join_link;
pub use self::join_link::*;

/// Reshapes a word stream from one bus width to another, inline like a process link.
mod adapter_link;
pub use self::adapter_link::*;

/// Clocks a whole `UdpStack` on a stream of datagrams.
mod stack_link;
pub use self::stack_link::*;

/// Takes a channel for input and converts it to a stream.
mod input_channel_link;
pub use self::input_channel_link::*;

/// Takes a stream and converts it to a channel for output.
mod output_channel_link;
pub use self::output_channel_link::*;
