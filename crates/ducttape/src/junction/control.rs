//! Fabric control frame handling.
//!
//! Control frames are signalling from the fabric itself. They are never
//! forwarded and never enter a cryptographic session; everything here
//! is parse, act locally, drop.

use tracing::{debug, info};

use super::dispatch::Junction;
use crate::error::{Result, Verdict};
use crate::wire::{Buffer, ControlHeader, ErrorCode, ErrorPayload, SwitchHeader};

impl Junction {
    /// Handle a control frame. `msg` is aligned on the control header;
    /// `header` carries the already-recovered (bit-reversed) label.
    pub(crate) fn handle_control(
        &mut self,
        msg: &Buffer,
        header: &SwitchHeader,
    ) -> Result<Verdict> {
        let ctrl = match ControlHeader::from_bytes(msg.as_slice()) {
            Ok(ctrl) => *ctrl,
            Err(_) => {
                debug!(len = msg.len(), "runt control frame, dropping");
                return Ok(Verdict::Handled);
            }
        };

        if ctrl.kind() != ControlHeader::ERROR {
            debug!(kind = ctrl.kind(), "unknown control frame, dropping");
            return Ok(Verdict::Handled);
        }

        let payload = match ErrorPayload::from_bytes(&msg.as_slice()[ControlHeader::LEN..]) {
            Ok(payload) => *payload,
            Err(_) => {
                debug!(len = msg.len(), "runt error control frame, dropping");
                return Ok(Verdict::Handled);
            }
        };

        // The cause carries the label as we emitted it, which is what
        // the recovered return label must equal. A mismatch means the
        // frame was corrupted somewhere.
        if payload.cause_label() != header.label() {
            debug!(
                cause = %payload.cause_label(),
                label = %header.label(),
                "error cause label does not match return label, dropping"
            );
            return Ok(Verdict::Handled);
        }

        match payload.code() {
            ErrorCode::MalformedAddress => {
                info!(label = %header.label(), "got malformed-address error, marking path broken");
                self.router_mut().broken_path(header.label());
            }
            code => {
                info!(code = %code, label = %header.label(), "got error control frame");
            }
        }

        Ok(Verdict::Handled)
    }
}
