//! Windowed packet buffer.
//!
//! A packet keeps all of its headers in one allocation; pipeline stages
//! move a start offset to peel a header off the front or to re-expose
//! room for one, without copying the payload. Each shift is validated
//! against the window.

use bytes::BytesMut;

use crate::error::{Error, Result};

/// Front slack reserved by [`Buffer::with_headroom`] callers that will
/// prepend headers later (crypto framing, IPv6, switch header).
pub const DEFAULT_HEADROOM: usize = 512;

/// A byte buffer with a moving start offset.
///
/// The *window* is the live region from the start offset to the end of
/// the backing storage. Bytes in front of the window are headroom:
/// already-peeled headers, or slack reserved for headers yet to be
/// written.
#[derive(Debug)]
pub struct Buffer {
    data: BytesMut,
    start: usize,
}

impl Buffer {
    /// Create a buffer holding `payload`, with `headroom` bytes of front
    /// slack for headers to be pushed later.
    pub fn with_headroom(payload: &[u8], headroom: usize) -> Self {
        let mut data = BytesMut::with_capacity(headroom + payload.len());
        data.resize(headroom, 0);
        data.extend_from_slice(payload);
        Self {
            data,
            start: headroom,
        }
    }

    /// Wrap a frame received from a collaborator; the window starts at
    /// the first byte.
    pub fn from_frame(data: BytesMut) -> Self {
        Self { data, start: 0 }
    }

    /// Length of the window.
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    /// Check if the window is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of front slack currently available.
    pub fn headroom(&self) -> usize {
        self.start
    }

    /// View the window.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.start..]
    }

    /// Mutable view of the window.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.start..]
    }

    /// Advance the window past `n` header bytes.
    pub fn pop(&mut self, n: usize) -> Result<()> {
        if n > self.len() {
            return Err(Error::Window {
                requested: n,
                available: self.len(),
            });
        }
        self.start += n;
        Ok(())
    }

    /// Widen the window by `n` bytes at the front and return them for
    /// writing. Regrows the backing storage when the headroom is
    /// exhausted, so buffers produced by collaborators without slack
    /// still work (at the cost of one copy).
    pub fn push(&mut self, n: usize) -> &mut [u8] {
        if self.start < n {
            self.regrow(n - self.start);
        }
        self.start -= n;
        &mut self.data[self.start..self.start + n]
    }

    /// Push `bytes` onto the front of the window.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.push(bytes.len()).copy_from_slice(bytes);
    }

    fn regrow(&mut self, shortfall: usize) {
        let extra = shortfall.max(DEFAULT_HEADROOM);
        let mut grown = BytesMut::with_capacity(extra + self.data.len());
        grown.resize(extra, 0);
        grown.extend_from_slice(&self.data);
        self.data = grown;
        self.start += extra;
    }
}
