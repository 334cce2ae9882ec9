//! Next-hop MAC resolution: a direct-mapped binding cache, the resolver that fills it, and
//! the serializer that puts its frames on the wire.

mod cache;
mod resolver;
mod serializer;

pub use self::cache::*;
pub use self::resolver::*;
pub use self::serializer::*;
