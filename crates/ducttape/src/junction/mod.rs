//! The routing and encryption junction.
//!
//! This module owns the packet-direction state machine. Frames from the
//! fabric, packets from the host's TUN device, and outbound DHT queries
//! all pass through [`Junction`], which strips and stacks headers,
//! drives the two cryptographic session layers, enforces the network's
//! identity and address invariants, and decides between local delivery
//! and forwarding.

mod address;
mod control;
mod crypto;
mod dispatch;
mod iface;
mod session;

pub use address::{NodeAddress, PublicKey, derive_ip6, verify_bind};
pub use crypto::{ContentEvent, ContentSessions, OuterCrypto, OuterEvent, OuterSession};
pub use dispatch::{DHT_MODULE_NAME, Junction, JunctionBuilder};
pub use iface::{DHT_MESSAGE_MAX, DhtMessage, DhtRegistry, Fabric, RouterOracle, TunDevice};
pub use session::{SessionTable, SessionTableConfig};
