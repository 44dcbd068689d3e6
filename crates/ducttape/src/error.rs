//! Error types for the junction.

/// Result type for junction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while dispatching packets.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from a collaborator (fabric, TUN device).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A header did not fit in the remaining window.
    #[error("truncated {what}: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Which header was being read.
        what: &'static str,
        /// Bytes required by the header.
        expected: usize,
        /// Bytes available in the window.
        actual: usize,
    },

    /// A window shift walked off the end of the buffer.
    #[error("buffer window out of range: requested {requested} bytes, {available} available")]
    Window {
        /// Bytes the shift asked for.
        requested: usize,
        /// Bytes left in the window.
        available: usize,
    },

    /// A cryptographic session refused the packet.
    #[error("session failure: {0}")]
    Session(String),

    /// A required collaborator was not supplied to the builder.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Registration with a collaborator failed during setup.
    #[error("{operation} failed: {source}")]
    Registration {
        /// The registration step that failed.
        operation: &'static str,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The driver's event channel is closed.
    #[error("event channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a session failure from any displayable reason.
    pub fn session(reason: impl Into<String>) -> Self {
        Self::Session(reason.into())
    }

    /// Check if this error means a header or window was too short.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::Window { .. })
    }
}

/// Outcome reported to the fabric or TUN caller for a single packet.
///
/// Every packet is fully handled inside the junction; the verdict only
/// records why a packet did not make it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The packet was delivered, forwarded, or consumed.
    Handled,
    /// The packet violated a header or identity invariant and was dropped.
    Invalid,
    /// The packet had nowhere to go: hop limit exhausted, no known next
    /// hop, or no TUN device configured.
    Undeliverable,
}

impl Verdict {
    /// Check if the packet made it through the pipeline.
    pub fn is_handled(self) -> bool {
        self == Self::Handled
    }
}
