//! Cryptographic session layers, consumed as traits.
//!
//! Two independent layers wrap every transit packet. The *outer* layer
//! encrypts hop-by-hop between fabric neighbors; sessions are bound to
//! fabric labels and owned by the junction's session table. The
//! *content* layer encrypts end-to-end between the two endpoints;
//! sessions are keyed by overlay address and owned by a session-manager
//! collaborator behind [`ContentSessions`].
//!
//! A decrypt call may produce a handshake reply instead of plaintext;
//! both layers surface that case as an event variant rather than a
//! callback, so the pipeline's bounded re-entry (at most two crypto
//! layers per packet) is visible in the call graph.

use super::address::PublicKey;
use crate::error::Result;
use crate::wire::Buffer;

/// Outcome of an outer-layer decrypt.
pub enum OuterEvent {
    /// Decrypted payload, aligned on the IPv6 header.
    Plaintext(Buffer),
    /// Handshake reply to be sent back along the reverse path, aligned
    /// on the outer crypto header.
    HandshakeReply(Buffer),
}

/// Outcome of a content-layer decrypt.
pub enum ContentEvent {
    /// Decrypted content plus the peer key the session authenticated.
    Plaintext {
        /// Payload aligned on the beginning of the content.
        msg: Buffer,
        /// The key at the far end of the session.
        peer_key: PublicKey,
    },
    /// Handshake reply emitted instead of plaintext. Its reassembled
    /// IPv6 header is addressed to ourselves; the pipeline flips the
    /// addresses to return it to the sender.
    HandshakeReply(Buffer),
}

/// Factory for outer (router-to-router) sessions.
pub trait OuterCrypto {
    /// Our long-term public key.
    fn public_key(&self) -> PublicKey;

    /// Open a session toward a peer whose key is already known.
    fn open_initiator(&mut self, peer: &PublicKey) -> Box<dyn OuterSession>;

    /// Open a session for an inbound handshake; the peer key is learned
    /// from the handshake itself.
    fn open_responder(&mut self) -> Box<dyn OuterSession>;
}

/// One outer session, bound to a single fabric label.
pub trait OuterSession {
    /// The peer's key. All zeroes only until the handshake has revealed
    /// it; the pipeline treats a zero key after decrypt as a fatal
    /// upstream fault.
    fn her_public_key(&self) -> PublicKey;

    /// Encrypt a frame for the peer. The returned buffer is aligned on
    /// the outer crypto header and owns enough headroom for the switch
    /// header.
    fn encrypt(&mut self, msg: Buffer) -> Result<Buffer>;

    /// Decrypt a frame from the peer.
    fn decrypt(&mut self, msg: Buffer) -> Result<OuterEvent>;
}

/// The content (end-to-end) session manager, keyed by overlay address.
pub trait ContentSessions {
    /// Encrypt `msg` for the peer at `peer_ip6`. `peer_key` is supplied
    /// when the caller knows the peer's identity (DHT sends); without
    /// it the manager must already hold a session for the address.
    fn encrypt(
        &mut self,
        peer_ip6: [u8; 16],
        peer_key: Option<&PublicKey>,
        msg: Buffer,
    ) -> Result<Buffer>;

    /// Decrypt a content frame that arrived from `peer_ip6`.
    fn decrypt(&mut self, peer_ip6: [u8; 16], msg: Buffer) -> Result<ContentEvent>;
}
