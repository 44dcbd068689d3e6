//! Fabric switch header.
//!
//! The label-switching fabric prefixes every frame with a fixed 12-byte
//! header: a 64-bit routing label plus a meta word whose top bits carry
//! the message class.

use std::fmt;

use zerocopy::byteorder::network_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Error, Result};

/// A 64-bit source-routed path along the fabric.
///
/// Labels are big-endian on the wire. The fabric consumes routing bits
/// from the bottom as a frame travels, so the label a frame *arrives*
/// with is the bit-reversal of the path back to its sender.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FabricLabel(u64);

impl FabricLabel {
    /// Wrap a raw label value.
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    /// Raw label value.
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Reverse the label's bits, turning an arrival label into the
    /// return path (and vice versa).
    pub const fn bit_reverse(self) -> Self {
        Self(self.0.reverse_bits())
    }
}

impl fmt::Display for FabricLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for FabricLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FabricLabel({:016x})", self.0)
    }
}

/// Message classes carried in the switch header meta word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Encrypted data frame.
    Data,
    /// Fabric-layer control frame (errors, probes).
    Control,
    /// Unrecognized class; treated as data by the pipeline.
    Other(u8),
}

impl MessageType {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Data,
            1 => Self::Control,
            other => Self::Other(other),
        }
    }

    fn into_bits(self) -> u8 {
        match self {
            Self::Data => 0,
            Self::Control => 1,
            Self::Other(other) => other,
        }
    }
}

/// Fabric switch header: routing label plus meta word.
///
/// The top 4 bits of `meta` are the message type; the remainder is
/// priority, which this junction preserves but does not interpret.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SwitchHeader {
    label: U64,
    meta: U32,
}

impl SwitchHeader {
    /// Size of the switch header on the wire.
    pub const LEN: usize = 12;

    const TYPE_SHIFT: u32 = 28;

    /// Create a data header for `label` with an empty meta word.
    pub fn new(label: FabricLabel) -> Self {
        Self {
            label: U64::new(label.bits()),
            meta: U32::new(0),
        }
    }

    /// The routing label.
    pub fn label(&self) -> FabricLabel {
        FabricLabel::new(self.label.get())
    }

    /// Replace the routing label.
    pub fn set_label(&mut self, label: FabricLabel) {
        self.label.set(label.bits());
    }

    /// The message class.
    pub fn message_type(&self) -> MessageType {
        MessageType::from_bits((self.meta.get() >> Self::TYPE_SHIFT) as u8)
    }

    /// Replace the message class, preserving the priority bits.
    pub fn set_message_type(&mut self, kind: MessageType) {
        let priority = self.meta.get() & ((1 << Self::TYPE_SHIFT) - 1);
        self.meta
            .set((u32::from(kind.into_bits()) << Self::TYPE_SHIFT) | priority);
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
                what: "switch header",
                expected: Self::LEN,
                actual: data.len(),
            })
    }
}
