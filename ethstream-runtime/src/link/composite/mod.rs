/// The whole transmit path, one task per stage.
mod transmit_link;
pub use self::transmit_link::*;
