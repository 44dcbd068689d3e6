//! UDP header.
//!
//! The junction only cares about UDP as the in-band marker for
//! router-to-router DHT traffic: both ports zero, length equal to the
//! payload, checksum transmitted as zero.

use zerocopy::byteorder::network_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};

/// Protocol number for UDP in the IPv6 next-header field.
pub const IPPROTO_UDP: u8 = 17;

/// Standard UDP header.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct UdpHeader {
    source_port: U16,
    dest_port: U16,
    length: U16,
    checksum: U16,
}

impl UdpHeader {
    /// Size of the UDP header on the wire.
    pub const LEN: usize = 8;

    /// Build the router-to-router marker header for a payload of
    /// `payload_len` bytes.
    pub fn router_marker(payload_len: u16) -> Self {
        Self {
            source_port: U16::new(0),
            dest_port: U16::new(0),
            length: U16::new(payload_len),
            checksum: U16::new(0),
        }
    }

    /// Source port.
    pub fn source_port(&self) -> u16 {
        self.source_port.get()
    }

    /// Destination port.
    pub fn dest_port(&self) -> u16 {
        self.dest_port.get()
    }

    /// Length field.
    pub fn length(&self) -> u16 {
        self.length.get()
    }

    /// Check the router-to-router marker: both ports zero and the length
    /// field covering exactly the payload behind this header.
    pub fn is_router_marker(&self, payload_len: usize) -> bool {
        self.source_port.get() == 0
            && self.dest_port.get() == 0
            && usize::from(self.length.get()) == payload_len
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
                what: "udp header",
                expected: Self::LEN,
                actual: data.len(),
            })
    }
}
