//! IPv6 header.
//!
//! The junction reads and rewrites the standard 40-byte IPv6 header. On
//! this network both endpoint addresses are derived from public keys and
//! always fall inside fc00::/8.

use std::net::Ipv6Addr;

use zerocopy::byteorder::network_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};

/// First byte of every valid address on the overlay (fc00::/8).
pub const ADDRESS_PREFIX: u8 = 0xFC;

/// Standard IPv6 header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Ip6Header {
    version_class_flow: U32,
    payload_len: U16,
    next_header: u8,
    hop_limit: u8,
    source: [u8; 16],
    destination: [u8; 16],
}

impl Ip6Header {
    /// Size of the IPv6 header on the wire.
    pub const LEN: usize = 40;

    /// Build a header with an empty traffic class and flow label. The
    /// payload length starts at zero; it is set once the payload size is
    /// known (after content encryption).
    pub fn new(source: [u8; 16], destination: [u8; 16], next_header: u8, hop_limit: u8) -> Self {
        Self {
            version_class_flow: U32::new(6 << 28),
            payload_len: U16::new(0),
            next_header,
            hop_limit,
            source,
            destination,
        }
    }

    /// Payload length in bytes (everything after this header).
    pub fn payload_len(&self) -> u16 {
        self.payload_len.get()
    }

    /// Replace the payload length.
    pub fn set_payload_len(&mut self, len: u16) {
        self.payload_len.set(len);
    }

    /// The next-header protocol number.
    pub fn next_header(&self) -> u8 {
        self.next_header
    }

    /// Remaining hop budget.
    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }

    /// Replace the hop limit.
    pub fn set_hop_limit(&mut self, hops: u8) {
        self.hop_limit = hops;
    }

    /// Source address bytes.
    pub fn source(&self) -> [u8; 16] {
        self.source
    }

    /// Replace the source address.
    pub fn set_source(&mut self, addr: [u8; 16]) {
        self.source = addr;
    }

    /// Destination address bytes.
    pub fn destination(&self) -> [u8; 16] {
        self.destination
    }

    /// Replace the destination address.
    pub fn set_destination(&mut self, addr: [u8; 16]) {
        self.destination = addr;
    }

    /// Source address for display.
    pub fn source_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.source)
    }

    /// Destination address for display.
    pub fn destination_addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.destination)
    }

    /// Check the overlay's header invariants: both addresses inside
    /// fc00::/8 and the payload length consistent with the window
    /// (`total_len` covers this header plus the payload).
    pub fn is_well_formed(&self, total_len: usize) -> bool {
        self.source[0] == ADDRESS_PREFIX
            && self.destination[0] == ADDRESS_PREFIX
            && total_len >= Self::LEN
            && usize::from(self.payload_len.get()) == total_len - Self::LEN
    }

    /// Convert header to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse header from the front of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                what: "ipv6 header",
                expected: Self::LEN,
                actual: data.len(),
            })
    }

    /// Parse a mutable header from the front of `data`.
    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        let actual = data.len();
        Self::mut_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(move |_| Error::Truncated {
                what: "ipv6 header",
                expected: Self::LEN,
                actual,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fc(last: u8) -> [u8; 16] {
        let mut addr = [0u8; 16];
        addr[0] = ADDRESS_PREFIX;
        addr[15] = last;
        addr
    }

    #[test]
    fn test_new_sets_version() {
        let header = Ip6Header::new(fc(1), fc(2), 17, 64);
        assert_eq!(header.as_bytes()[0] >> 4, 6);
        assert_eq!(header.next_header(), 17);
        assert_eq!(header.hop_limit(), 64);
    }

    #[test]
    fn test_well_formed() {
        let mut header = Ip6Header::new(fc(1), fc(2), 17, 64);
        header.set_payload_len(100);
        assert!(header.is_well_formed(Ip6Header::LEN + 100));
        // Length mismatch.
        assert!(!header.is_well_formed(Ip6Header::LEN + 99));
    }

    #[test]
    fn test_rejects_non_overlay_addresses() {
        let mut outside = fc(1);
        outside[0] = 0x20;
        let header = Ip6Header::new(outside, fc(2), 17, 64);
        assert!(!header.is_well_formed(Ip6Header::LEN));

        let header = Ip6Header::new(fc(1), outside, 17, 64);
        assert!(!header.is_well_formed(Ip6Header::LEN));
    }

    #[test]
    fn test_mutate_in_place() {
        let mut bytes = Ip6Header::new(fc(1), fc(2), 17, 5).as_bytes().to_vec();
        {
            let header = Ip6Header::from_bytes_mut(&mut bytes).unwrap();
            header.set_hop_limit(header.hop_limit() - 1);
        }
        let header = Ip6Header::from_bytes(&bytes).unwrap();
        assert_eq!(header.hop_limit(), 4);
    }

    #[test]
    fn test_truncated() {
        let err = Ip6Header::from_bytes(&[0u8; 39]).unwrap_err();
        assert!(err.is_truncated());
    }
}
