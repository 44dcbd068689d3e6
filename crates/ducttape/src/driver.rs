//! Single-threaded event pump.
//!
//! The junction itself never blocks and never suspends; something has
//! to feed it. The driver is that something: a bounded channel of
//! events drained by one task, one packet at a time, which preserves
//! the junction's strict single-packet execution model while letting
//! fabric, TUN, and DHT producers run anywhere on the runtime.
//!
//! The junction holds non-`Send` collaborator handles, so the driver
//! future is not `Send` either: run it on the current task or a
//! `LocalSet`, not via `tokio::spawn`.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::junction::{Junction, NodeAddress};

/// One unit of work for the junction.
#[derive(Debug)]
pub enum Event {
    /// A `[SwitchHeader | ciphertext]` frame from the fabric.
    Fabric(BytesMut),
    /// An IPv6 packet injected by the host through the TUN device.
    Tun(BytesMut),
    /// An outbound DHT query.
    Dht {
        /// The peer the query is for.
        target: NodeAddress,
        /// Raw DHT payload.
        payload: Bytes,
    },
}

/// Cloneable handle for feeding events to a [`Driver`].
#[derive(Clone)]
pub struct DriverHandle {
    tx: mpsc::Sender<Event>,
}

impl DriverHandle {
    /// Queue a fabric frame.
    pub async fn fabric_frame(&self, frame: BytesMut) -> Result<()> {
        self.send(Event::Fabric(frame)).await
    }

    /// Queue a host packet.
    pub async fn tun_packet(&self, packet: BytesMut) -> Result<()> {
        self.send(Event::Tun(packet)).await
    }

    /// Queue an outbound DHT query.
    pub async fn dht_query(&self, target: NodeAddress, payload: Bytes) -> Result<()> {
        self.send(Event::Dht { target, payload }).await
    }

    async fn send(&self, event: Event) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::ChannelClosed)
    }
}

/// Drains events into a [`Junction`].
pub struct Driver {
    junction: Junction,
    rx: mpsc::Receiver<Event>,
}

impl Driver {
    /// Wrap a junction with an event queue of the given depth.
    pub fn new(junction: Junction, queue_depth: usize) -> (Self, DriverHandle) {
        let (tx, rx) = mpsc::channel(queue_depth);
        (Self { junction, rx }, DriverHandle { tx })
    }

    /// The wrapped junction.
    pub fn junction_mut(&mut self) -> &mut Junction {
        &mut self.junction
    }

    /// Run until every [`DriverHandle`] is dropped.
    ///
    /// Dispatch failures are logged and the loop continues; a bad
    /// packet never takes the pump down.
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            let outcome = match event {
                Event::Fabric(frame) => self.junction.in_from_switch(frame),
                Event::Tun(packet) => self.junction.in_from_tun(packet),
                Event::Dht { target, payload } => {
                    self.junction.handle_outgoing(&target, &payload)
                }
            };
            match outcome {
                Ok(verdict) => trace!(?verdict, "packet dispatched"),
                Err(err) => warn!(error = %err, "dispatch failed"),
            }
        }
    }
}
