//! Non-cryptographic collaborators, consumed as traits.
//!
//! The junction sits between the fabric switch, the host's TUN device,
//! the DHT module registry, and the DHT routing oracle. Each is a black
//! box behind a small trait; the junction owns one handle to each.

use super::address::NodeAddress;
use crate::error::Result;
use crate::wire::FabricLabel;

/// Largest DHT message handed to the registry; longer payloads are
/// truncated on delivery.
pub const DHT_MESSAGE_MAX: usize = 1536;

/// A decrypted router-to-router message plus the verified identity of
/// the node that sent it. The bytes are borrowed from the packet being
/// dispatched and are only valid for the duration of the handoff.
#[derive(Debug)]
pub struct DhtMessage<'a> {
    /// The DHT payload, UDP marker already stripped.
    pub bytes: &'a [u8],
    /// The sender: authenticated key, derived address, and the fabric
    /// path it arrived on.
    pub source: NodeAddress,
}

/// The label-switching fabric beneath the junction.
pub trait Fabric {
    /// Emit a `[SwitchHeader | ciphertext]` frame onto the fabric.
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    /// Claim the fabric's router interface slot, so inbound frames are
    /// delivered to the junction.
    fn attach_router(&mut self) -> Result<()>;
}

/// The host-facing tunnel device.
pub trait TunDevice {
    /// Deliver a decrypted application IPv6 packet to the host.
    fn send(&mut self, packet: &[u8]) -> Result<()>;
}

/// The DHT routing table, consulted as an oracle.
pub trait RouterOracle {
    /// Best known next hop toward `destination`, if any.
    fn best_next_hop(&mut self, destination: &[u8; 16]) -> Option<NodeAddress>;

    /// Announce a freshly verified peer.
    fn add_node(&mut self, node: NodeAddress);

    /// Report a fabric path a peer flagged as unusable.
    fn broken_path(&mut self, label: FabricLabel);
}

/// The DHT module registry.
pub trait DhtRegistry {
    /// Register the junction as a module under `name`.
    fn register(&mut self, name: &'static str) -> Result<()>;

    /// Deliver an inbound router-to-router message to the DHT core.
    fn handle_incoming(&mut self, message: DhtMessage<'_>) -> Result<()>;
}
