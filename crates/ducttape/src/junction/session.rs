//! Outer session table.
//!
//! Maps fabric labels to outer cryptographic sessions. Sessions are
//! created lazily on the first packet to or from a label: as initiator
//! when the peer's key is already known (forwarding), as responder when
//! it will be learned from the inbound handshake. Entries are evicted
//! when idle too long or when the table is full; sessions that carry
//! continuous traffic are never displaced by the idle sweep.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use super::address::PublicKey;
use super::crypto::{OuterCrypto, OuterSession};
use crate::wire::FabricLabel;

/// Tuning for the outer session table.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionTableConfig {
    /// Maximum number of live sessions. The stalest entry is displaced
    /// when a new label arrives at capacity.
    pub capacity: usize,
    /// Sessions idle longer than this are swept.
    pub idle_timeout: Duration,
}

impl Default for SessionTableConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            idle_timeout: Duration::from_secs(120),
        }
    }
}

struct Entry {
    session: Box<dyn OuterSession>,
    last_seen: Instant,
}

/// Label-keyed cache of outer sessions.
pub struct SessionTable {
    entries: HashMap<u64, Entry>,
    config: SessionTableConfig,
}

impl SessionTable {
    /// Create an empty table.
    pub fn new(config: SessionTableConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the session for `label`, creating one lazily.
    ///
    /// `peer_key` binds a fresh session as initiator; without it the
    /// fresh session is a responder that learns the key from the
    /// handshake. The entry's timestamp is refreshed on every access.
    pub fn get_or_create(
        &mut self,
        label: FabricLabel,
        peer_key: Option<&PublicKey>,
        crypto: &mut dyn OuterCrypto,
    ) -> &mut dyn OuterSession {
        let now = Instant::now();
        self.sweep_at(now);

        if !self.entries.contains_key(&label.bits()) && self.entries.len() >= self.config.capacity {
            self.displace_stalest();
        }

        let entry = match self.entries.entry(label.bits()) {
            std::collections::hash_map::Entry::Occupied(occupied) => occupied.into_mut(),
            std::collections::hash_map::Entry::Vacant(vacant) => {
                let session = match peer_key {
                    Some(key) => crypto.open_initiator(key),
                    None => crypto.open_responder(),
                };
                debug!(%label, initiator = peer_key.is_some(), "opened outer session");
                vacant.insert(Entry {
                    session,
                    last_seen: now,
                })
            }
        };
        entry.last_seen = now;
        entry.session.as_mut()
    }

    /// Drop sessions that have been idle past the timeout.
    pub fn evict_idle(&mut self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&mut self, now: Instant) {
        let timeout = self.config.idle_timeout;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.last_seen) < timeout);
        let swept = before - self.entries.len();
        if swept > 0 {
            debug!(swept, "swept idle outer sessions");
        }
    }

    fn displace_stalest(&mut self) {
        let stalest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(label, _)| *label);
        if let Some(label) = stalest {
            self.entries.remove(&label);
            debug!(label = %FabricLabel::new(label), "displaced stalest outer session");
        }
    }
}
