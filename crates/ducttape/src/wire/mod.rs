//! Wire formats stacked by the junction.
//!
//! The junction does not define any of these formats; it inherits them
//! from the surrounding protocol and is bit-exact in how it stacks them:
//! `[SwitchHeader | outer crypto | IP6Header | inner crypto | payload]`
//! for transit traffic, with a `[UDP(0,0)]` marker in front of
//! router-to-router DHT payloads.
//!
//! Headers are `#[repr(C)]` zerocopy structs in network byte order,
//! parsed in place from the front of a [`Buffer`] window.

pub mod buffer;
pub mod control;
pub mod ip6;
pub mod switch;
pub mod udp;

pub use buffer::{Buffer, DEFAULT_HEADROOM};
pub use control::{ControlHeader, ErrorCode, ErrorPayload};
pub use ip6::{ADDRESS_PREFIX, Ip6Header};
pub use switch::{FabricLabel, MessageType, SwitchHeader};
pub use udp::{IPPROTO_UDP, UdpHeader};
