//! Node identity and address derivation.
//!
//! Every node's overlay address is derived from its public key: the
//! first 16 bytes of a double SHA-512 of the key. Only keys whose
//! derived address begins with `0xFC` are usable on the network, which
//! binds each IPv6 address to exactly one keypair.

use std::fmt;
use std::net::Ipv6Addr;

use sha2::{Digest, Sha512};

use crate::wire::{ADDRESS_PREFIX, FabricLabel};

/// A 32-byte public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Key length in bytes.
    pub const LEN: usize = 32;

    /// Check for the all-zero key. Sessions surface a zero key only
    /// before their handshake has revealed the peer; the pipeline must
    /// never see one.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

/// Derive a node's overlay address from its public key.
///
/// This is the address-prefix construction: the first 16 bytes of
/// `SHA-512(SHA-512(key))`. It is used for our own address, for session
/// peers, and for inbound binding checks, and must be byte-identical at
/// every call site.
pub fn derive_ip6(key: &PublicKey) -> [u8; 16] {
    let first = Sha512::digest(key.0);
    let second = Sha512::digest(first);
    let mut ip6 = [0u8; 16];
    ip6.copy_from_slice(&second[..16]);
    ip6
}

/// Check a claimed source address against the address derived from the
/// session key it arrived under.
pub fn verify_bind(expected: &[u8; 16], claimed: &[u8; 16]) -> bool {
    expected == claimed
}

/// A peer's full identity: key, derived address, and the fabric path to
/// reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    /// The peer's public key.
    pub key: PublicKey,
    /// Overlay address derived from `key`.
    pub ip6: [u8; 16],
    /// Fabric label routing to the peer.
    pub label: FabricLabel,
}

impl NodeAddress {
    /// Build a node address, deriving the overlay address from the key.
    pub fn from_key(key: PublicKey, label: FabricLabel) -> Self {
        let ip6 = derive_ip6(&key);
        Self { key, ip6, label }
    }

    /// Check that the derived address is inside fc00::/8.
    pub fn has_valid_prefix(&self) -> bool {
        self.ip6[0] == ADDRESS_PREFIX
    }

    /// Overlay address for display.
    pub fn ip6_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.ip6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let key = PublicKey([7u8; 32]);
        assert_eq!(derive_ip6(&key), derive_ip6(&key));
    }

    #[test]
    fn test_different_keys_differ() {
        let a = derive_ip6(&PublicKey([1u8; 32]));
        let b = derive_ip6(&PublicKey([2u8; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn test_from_key_matches_derivation() {
        let key = PublicKey([9u8; 32]);
        let node = NodeAddress::from_key(key, FabricLabel::new(3));
        assert_eq!(node.ip6, derive_ip6(&key));
        assert_eq!(node.label, FabricLabel::new(3));
    }

    #[test]
    fn test_verify_bind() {
        let addr = derive_ip6(&PublicKey([5u8; 32]));
        assert!(verify_bind(&addr, &addr));

        let mut other = addr;
        other[15] ^= 1;
        assert!(!verify_bind(&addr, &other));
    }

    #[test]
    fn test_zero_key() {
        assert!(PublicKey([0u8; 32]).is_zero());
        assert!(!PublicKey([1u8; 32]).is_zero());
    }

    #[test]
    fn test_key_display() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        bytes[31] = 0x01;
        let hex = PublicKey(bytes).to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.starts_with("ab"));
        assert!(hex.ends_with("01"));
    }
}
