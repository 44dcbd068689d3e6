//! Packet routing and encryption junction for an fc00::/8 mesh overlay.
//!
//! This crate implements the component where every packet direction of
//! the overlay converges: frames arriving from the label-switching
//! fabric, IPv6 packets injected by the host through a TUN device,
//! outbound DHT queries, and handshake replies that sessions emit back
//! at us. The junction classifies each packet, shifts its header
//! window, drives the outer (router-to-router) and content (end-to-end)
//! cryptographic layers, enforces the network's key/address binding
//! invariants, and either delivers locally or forwards along the best
//! known fabric path.
//!
//! Cryptography, switching, DHT routing, and the tunnel device are
//! external collaborators consumed through traits; see [`junction`].
//!
//! # Example
//!
//! ```ignore
//! use ducttape::junction::Junction;
//! use ducttape::driver::Driver;
//!
//! let junction = Junction::builder()
//!     .outer_crypto(crypto)
//!     .content_sessions(sessions)
//!     .dht_registry(registry)
//!     .router_oracle(router)
//!     .fabric(switch)
//!     .tun_device(tun)
//!     .build()?;
//!
//! let (driver, handle) = Driver::new(junction, 64);
//!
//! // Feed frames from the fabric...
//! handle.fabric_frame(frame).await?;
//!
//! // ...and drain them one at a time.
//! driver.run().await;
//! ```
//!
//! # Features
//!
//! - `serde` - serde derives on configuration types

pub mod driver;
pub mod error;
pub mod junction;
pub mod wire;

pub use error::{Error, Result, Verdict};
pub use junction::{Junction, JunctionBuilder, NodeAddress, PublicKey, SessionTableConfig};
pub use wire::{Buffer, FabricLabel};
