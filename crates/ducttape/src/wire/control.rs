//! Fabric control frames.
//!
//! Control frames are fabric-layer signalling: they never enter a
//! cryptographic session and are never forwarded. The only type the
//! junction acts on is `ERROR`, which carries an error code and the
//! switch header of the frame that caused it.

use std::fmt;

use zerocopy::byteorder::network_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::switch::{FabricLabel, SwitchHeader};
use crate::error::{Error, Result};

/// Control frame header: checksum plus frame type.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ControlHeader {
    checksum: U16,
    kind: U16,
}

impl ControlHeader {
    /// Size of the control header on the wire.
    pub const LEN: usize = 4;

    /// Frame type for path error reports.
    pub const ERROR: u16 = 2;

    /// The control frame type.
    pub fn kind(&self) -> u16 {
        self.kind.get()
    }

    /// Build a header of the given type with a zero checksum.
    pub fn new(kind: u16) -> Self {
        Self {
            checksum: U16::new(0),
            kind: U16::new(kind),
        }
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
                what: "control header",
                expected: Self::LEN,
                actual: data.len(),
            })
    }
}

/// Payload of an `ERROR` control frame: the error code and the switch
/// header of the offending frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ErrorPayload {
    code: U32,
    cause: SwitchHeader,
}

impl ErrorPayload {
    /// Size of the error payload on the wire.
    pub const LEN: usize = 4 + SwitchHeader::LEN;

    /// Build an error payload.
    pub fn new(code: ErrorCode, cause: SwitchHeader) -> Self {
        Self {
            code: U32::new(code.into_wire()),
            cause,
        }
    }

    /// The reported error code.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from_wire(self.code.get())
    }

    /// The label the reporting node saw on the offending frame.
    pub fn cause_label(&self) -> FabricLabel {
        self.cause.label()
    }

    /// Convert payload to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse payload from the front of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                what: "error control payload",
                expected: Self::LEN,
                actual: data.len(),
            })
    }
}

/// Error codes carried in `ERROR` control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No error.
    None,
    /// The label did not parse at some hop.
    MalformedAddress,
    /// The peer is sending too fast.
    Flood,
    /// The link cannot take frames this large.
    LinkLimitExceeded,
    /// Frame over the fabric MTU.
    OversizeMessage,
    /// Frame too short to carry its headers.
    UndersizeMessage,
    /// Authentication failed at the far end.
    Authentication,
    /// Header invariant violation.
    Invalid,
    /// No route to the destination.
    Undeliverable,
    /// The label would revisit a hop.
    LoopRoute,
    /// The return path did not parse.
    ReturnPathInvalid,
    /// Unrecognized code.
    Unknown(u32),
}

impl ErrorCode {
    /// Decode a wire error code.
    pub fn from_wire(code: u32) -> Self {
        match code {
            0 => Self::None,
            1 => Self::MalformedAddress,
            2 => Self::Flood,
            3 => Self::LinkLimitExceeded,
            4 => Self::OversizeMessage,
            5 => Self::UndersizeMessage,
            6 => Self::Authentication,
            7 => Self::Invalid,
            8 => Self::Undeliverable,
            9 => Self::LoopRoute,
            10 => Self::ReturnPathInvalid,
            other => Self::Unknown(other),
        }
    }

    /// Encode to the wire representation.
    pub fn into_wire(self) -> u32 {
        match self {
            Self::None => 0,
            Self::MalformedAddress => 1,
            Self::Flood => 2,
            Self::LinkLimitExceeded => 3,
            Self::OversizeMessage => 4,
            Self::UndersizeMessage => 5,
            Self::Authentication => 6,
            Self::Invalid => 7,
            Self::Undeliverable => 8,
            Self::LoopRoute => 9,
            Self::ReturnPathInvalid => 10,
            Self::Unknown(other) => other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::MalformedAddress => write!(f, "malformed address"),
            Self::Flood => write!(f, "flood"),
            Self::LinkLimitExceeded => write!(f, "link limit exceeded"),
            Self::OversizeMessage => write!(f, "oversize message"),
            Self::UndersizeMessage => write!(f, "undersize message"),
            Self::Authentication => write!(f, "authentication"),
            Self::Invalid => write!(f, "invalid"),
            Self::Undeliverable => write!(f, "undeliverable"),
            Self::LoopRoute => write!(f, "loop route"),
            Self::ReturnPathInvalid => write!(f, "return path invalid"),
            Self::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}
