mod types;
pub use self::types::*;

mod checksum;
pub use self::checksum::*;

mod ethernet;
pub use self::ethernet::*;

mod arp;
pub use self::arp::*;

mod ipv4;
pub use self::ipv4::*;

mod udp;
pub use self::udp::*;

mod header;
pub use self::header::*;
