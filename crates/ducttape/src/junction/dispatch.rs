//! The packet pipeline.
//!
//! Every packet direction converges here: frames from the fabric,
//! packets injected by the host through the TUN device, outbound DHT
//! queries, and handshake replies a session emits back at us. Each
//! entry point runs to completion inside one event-loop tick; the
//! pipeline never suspends, and re-enters itself at most twice (once
//! per crypto layer).
//!
//! Per-packet state is threaded through the stages as an explicit
//! [`Envelope`] plus arguments, never stored on the junction, so each
//! stage's inputs are visible in its signature.

use bytes::BytesMut;
use std::net::Ipv6Addr;
use tracing::{debug, warn};

use super::address::{NodeAddress, PublicKey, derive_ip6, verify_bind};
use super::crypto::{ContentEvent, ContentSessions, OuterCrypto, OuterEvent};
use super::iface::{DHT_MESSAGE_MAX, DhtMessage, DhtRegistry, Fabric, RouterOracle, TunDevice};
use super::session::{SessionTable, SessionTableConfig};
use crate::error::{Error, Result, Verdict};
use crate::wire::{
    Buffer, DEFAULT_HEADROOM, FabricLabel, IPPROTO_UDP, Ip6Header, MessageType, SwitchHeader,
    UdpHeader,
};

/// Name the junction registers under in the DHT module registry.
pub const DHT_MODULE_NAME: &str = "Ducttape";

/// Per-packet state carried across pipeline stages.
///
/// `switch_header` preserves the fabric header across the outer
/// session's rewrite of the frame front (zeroed for locally originated
/// packets). `forward_to` is set only for router-to-router sends, where
/// the destination is already known and the next-hop oracle must be
/// bypassed; the forwarding stage takes it exactly once.
pub(crate) struct Envelope {
    pub switch_header: SwitchHeader,
    pub forward_to: Option<NodeAddress>,
}

impl Envelope {
    fn local() -> Self {
        Self {
            switch_header: SwitchHeader::new(FabricLabel::new(0)),
            forward_to: None,
        }
    }
}

/// The routing and encryption junction.
///
/// Owns the outer session table and one handle to each collaborator;
/// see the module docs for the pipeline layout. Construct with
/// [`Junction::builder`].
pub struct Junction {
    addr: NodeAddress,
    crypto: Box<dyn OuterCrypto>,
    content: Box<dyn ContentSessions>,
    sessions: SessionTable,
    registry: Box<dyn DhtRegistry>,
    router: Box<dyn RouterOracle>,
    fabric: Box<dyn Fabric>,
    tun: Option<Box<dyn TunDevice>>,
}

impl Junction {
    /// Start building a junction.
    pub fn builder() -> JunctionBuilder {
        JunctionBuilder::default()
    }

    /// Our own identity (label zero).
    pub fn my_address(&self) -> &NodeAddress {
        &self.addr
    }

    /// Number of live outer sessions.
    pub fn outer_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Sweep idle outer sessions. Safe to call from a maintenance
    /// timer; sessions with ongoing traffic are unaffected.
    pub fn evict_idle_sessions(&mut self) {
        self.sessions.evict_idle();
    }

    /// Entry point for frames delivered by the fabric:
    /// `[SwitchHeader | ciphertext]`, or a control frame.
    pub fn in_from_switch(&mut self, frame: BytesMut) -> Result<Verdict> {
        let mut msg = Buffer::from_frame(frame);
        let mut header = match SwitchHeader::from_bytes(msg.as_slice()) {
            Ok(header) => *header,
            Err(_) => {
                debug!(len = msg.len(), "runt frame from fabric, dropping");
                return Ok(Verdict::Invalid);
            }
        };
        msg.pop(SwitchHeader::LEN)?;

        // The fabric cannot know we are the last hop, so the label
        // arrives bit-reversed; reversing it recovers the sender's path.
        header.set_label(header.label().bit_reverse());

        if header.message_type() == MessageType::Control {
            return self.handle_control(&msg, &header);
        }

        let label = header.label();
        let mut env = Envelope {
            switch_header: header,
            forward_to: None,
        };

        let (event, her_key) = {
            let session = self.sessions.get_or_create(label, None, self.crypto.as_mut());
            match session.decrypt(msg) {
                Ok(event) => (event, session.her_public_key()),
                Err(err) => {
                    debug!(%label, error = %err, "outer decrypt failed, dropping frame");
                    return Ok(Verdict::Invalid);
                }
            }
        };

        match event {
            OuterEvent::HandshakeReply(reply) => {
                // The reply rides the recovered label straight back.
                self.send_to_switch(reply, &header)
            }
            OuterEvent::Plaintext(plain) => self.received_from_outer(plain, her_key, &mut env),
        }
    }

    /// Entry point for IPv6 packets injected by the host.
    pub fn in_from_tun(&mut self, packet: BytesMut) -> Result<Verdict> {
        let mut msg = Buffer::from_frame(packet);
        let header = match Ip6Header::from_bytes(msg.as_slice()) {
            Ok(header) if header.is_well_formed(msg.len()) => *header,
            _ => {
                debug!("dropped packet from tun, not valid ipv6");
                return Ok(Verdict::Invalid);
            }
        };

        // Only our own derived address may source traffic here.
        if header.source() != self.addr.ip6 {
            warn!(
                source = %header.source_addr(),
                ours = %self.addr.ip6_addr(),
                "dropped packet from tun, source address is not ours"
            );
            return Ok(Verdict::Invalid);
        }

        msg.pop(Ip6Header::LEN)?;
        let cipher = match self.content.encrypt(header.destination(), None, msg) {
            Ok(cipher) => cipher,
            Err(err) => {
                debug!(
                    destination = %header.destination_addr(),
                    error = %err,
                    "content encrypt failed, dropping packet"
                );
                return Ok(Verdict::Undeliverable);
            }
        };

        self.outgoing_from_me(cipher, header, &mut Envelope::local())
    }

    /// Entry point for the DHT registry: emit `payload` as a
    /// router-to-router query to `target`.
    ///
    /// Synthesizes the zero-port UDP marker and an IPv6 header with a
    /// hop budget of one, then sends through the content session. The
    /// target is pinned in the envelope so the forwarding stage skips
    /// the next-hop oracle.
    pub fn handle_outgoing(&mut self, target: &NodeAddress, payload: &[u8]) -> Result<Verdict> {
        let mut msg = Buffer::with_headroom(payload, DEFAULT_HEADROOM);
        let udp = UdpHeader::router_marker(payload.len() as u16);
        msg.push_bytes(udp.as_bytes());

        let header = Ip6Header::new(self.addr.ip6, target.ip6, IPPROTO_UDP, 1);
        let mut env = Envelope {
            switch_header: SwitchHeader::new(FabricLabel::new(0)),
            forward_to: Some(target.clone()),
        };

        let cipher = match self
            .content
            .encrypt(target.ip6, Some(&target.key), msg)
        {
            Ok(cipher) => cipher,
            Err(err) => {
                debug!(
                    target = %target.ip6_addr(),
                    error = %err,
                    "content encrypt failed, dropping dht query"
                );
                return Ok(Verdict::Undeliverable);
            }
        };

        self.outgoing_from_me(cipher, header, &mut env)
    }

    /// A frame decrypted by the outer layer: bind the peer's identity,
    /// announce it to the router, and hand the packet to the pipeline.
    fn received_from_outer(
        &mut self,
        msg: Buffer,
        her_key: PublicKey,
        env: &mut Envelope,
    ) -> Result<Verdict> {
        // The outer layer owns the handshake; by the time plaintext
        // reaches us it must know who sent it.
        assert!(
            !her_key.is_zero(),
            "outer session produced plaintext with a zero peer key"
        );

        let node = NodeAddress::from_key(her_key, env.switch_header.label());
        if !node.has_valid_prefix() {
            debug!(key = %her_key, "peer key derives outside fc00::/8, ignoring");
            return Ok(Verdict::Invalid);
        }

        match Ip6Header::from_bytes(msg.as_slice()) {
            Ok(header) if header.is_well_formed(msg.len()) => {}
            _ => {
                debug!("dropping packet with invalid ipv6 header");
                return Ok(Verdict::Invalid);
            }
        }

        self.router.add_node(node);

        self.decrypted_incoming(msg, env)
    }

    /// A plaintext packet aligned on its IPv6 header, from either
    /// direction: classify as ours or in transit, and dispatch.
    fn decrypted_incoming(&mut self, mut msg: Buffer, env: &mut Envelope) -> Result<Verdict> {
        let header = match Ip6Header::from_bytes(msg.as_slice()) {
            Ok(header) if header.is_well_formed(msg.len()) => *header,
            _ => {
                debug!("dropping packet with invalid ipv6 header");
                return Ok(Verdict::Invalid);
            }
        };

        if header.destination() == self.addr.ip6 {
            msg.pop(Ip6Header::LEN)?;
            let event = match self.content.decrypt(header.source(), msg) {
                Ok(event) => event,
                Err(err) => {
                    debug!(
                        source = %header.source_addr(),
                        error = %err,
                        "content decrypt failed, dropping packet"
                    );
                    return Ok(Verdict::Invalid);
                }
            };
            return match event {
                ContentEvent::Plaintext { msg, peer_key } => {
                    self.incoming_for_me(msg, peer_key, &header, env)
                }
                ContentEvent::HandshakeReply(reply) => self.outgoing_from_me(reply, header, env),
            };
        }

        if header.hop_limit() == 0 {
            debug!(
                destination = %header.destination_addr(),
                "hop limit exhausted, dropping packet"
            );
            return Ok(Verdict::Undeliverable);
        }
        {
            let header = Ip6Header::from_bytes_mut(msg.as_mut_slice())?;
            header.set_hop_limit(header.hop_limit() - 1);
        }

        if let Some(target) = env.forward_to.take() {
            // Router-to-router: the destination is already decided.
            return self.send_to_router(&target, msg, env);
        }

        match self.router.best_next_hop(&header.destination()) {
            Some(next) => self.send_to_router(&next, msg, env),
            None => {
                debug!(
                    destination = %header.destination_addr(),
                    "no known next hop, dropping packet"
                );
                Ok(Verdict::Undeliverable)
            }
        }
    }

    /// Content-layer plaintext addressed to us: verify the sender's
    /// identity binding, then deliver to the DHT or the host.
    fn incoming_for_me(
        &mut self,
        mut msg: Buffer,
        peer_key: PublicKey,
        ip6: &Ip6Header,
        env: &Envelope,
    ) -> Result<Verdict> {
        let derived = derive_ip6(&peer_key);
        if !verify_bind(&derived, &ip6.source()) {
            debug!(
                source = %ip6.source_addr(),
                key_hash = %Ipv6Addr::from(derived),
                "dropped packet, source address does not match the session key"
            );
            return Ok(Verdict::Invalid);
        }

        if is_router_traffic(ip6, &msg) {
            msg.pop(UdpHeader::LEN)?;
            let source = NodeAddress {
                key: peer_key,
                ip6: derived,
                label: env.switch_header.label(),
            };
            return self.incoming_dht(&msg, source);
        }

        match self.tun.as_deref_mut() {
            Some(tun) => {
                // Re-apply the IPv6 header in front of the content; the
                // crypto header that sat between them is gone, so the
                // payload length shrinks to what is left.
                let mut header = *ip6;
                header.set_payload_len(msg.len() as u16);
                msg.push_bytes(header.as_bytes());
                tun.send(msg.as_slice())?;
                Ok(Verdict::Handled)
            }
            None => {
                warn!("dropping packet, no tun device configured");
                Ok(Verdict::Undeliverable)
            }
        }
    }

    /// Content-layer output on the send side: re-apply the IPv6 header
    /// and forward. A reply the content session kicked back while
    /// decrypting is addressed to ourselves; flip the addresses so it
    /// returns to the sender.
    fn outgoing_from_me(
        &mut self,
        mut cipher: Buffer,
        mut ip6: Ip6Header,
        env: &mut Envelope,
    ) -> Result<Verdict> {
        // The crypto header in front of the content counts toward the
        // payload now.
        ip6.set_payload_len(cipher.len() as u16);

        if ip6.destination() == self.addr.ip6 {
            let sender = ip6.source();
            ip6.set_destination(sender);
            ip6.set_source(self.addr.ip6);
        }

        cipher.push_bytes(ip6.as_bytes());
        self.decrypted_incoming(cipher, env)
    }

    /// Deliver a router-to-router message to the DHT registry.
    fn incoming_dht(&mut self, msg: &Buffer, source: NodeAddress) -> Result<Verdict> {
        let bytes = msg.as_slice();
        let bytes = &bytes[..bytes.len().min(DHT_MESSAGE_MAX)];
        self.registry.handle_incoming(DhtMessage { bytes, source })?;
        Ok(Verdict::Handled)
    }

    /// Encrypt through the outer session for `to` and hand the frame to
    /// the fabric.
    fn send_to_router(
        &mut self,
        to: &NodeAddress,
        msg: Buffer,
        env: &mut Envelope,
    ) -> Result<Verdict> {
        // The outer session rewrites the frame front with its own
        // headers; keep the switch header aside and re-apply it after.
        env.switch_header.set_label(to.label);
        let header = env.switch_header;

        let cipher = {
            let session = self
                .sessions
                .get_or_create(to.label, Some(&to.key), self.crypto.as_mut());
            match session.encrypt(msg) {
                Ok(cipher) => cipher,
                Err(err) => {
                    debug!(label = %to.label, error = %err, "outer encrypt failed, dropping packet");
                    return Ok(Verdict::Invalid);
                }
            }
        };

        self.send_to_switch(cipher, &header)
    }

    /// Prepend the switch header and emit the frame.
    fn send_to_switch(&mut self, mut frame: Buffer, header: &SwitchHeader) -> Result<Verdict> {
        frame.push_bytes(header.as_bytes());
        self.fabric.send(frame.as_slice())?;
        Ok(Verdict::Handled)
    }

    pub(crate) fn router_mut(&mut self) -> &mut dyn RouterOracle {
        self.router.as_mut()
    }
}

/// Router-to-router traffic marker: UDP with both ports zero, a spent
/// hop budget, and a length field covering exactly the payload.
/// Application UDP always arrives with a nonzero hop limit, so the two
/// cannot collide.
fn is_router_traffic(ip6: &Ip6Header, msg: &Buffer) -> bool {
    if ip6.next_header() != IPPROTO_UDP || ip6.hop_limit() != 0 {
        return false;
    }
    match UdpHeader::from_bytes(msg.as_slice()) {
        Ok(udp) => udp.is_router_marker(msg.len() - UdpHeader::LEN),
        Err(_) => false,
    }
}

/// Builder wiring the junction to its collaborators.
///
/// `build` performs the two registrations the junction needs to start
/// receiving traffic: the DHT module under [`DHT_MODULE_NAME`] and the
/// fabric's router interface slot. Either failure fails the build.
#[derive(Default)]
pub struct JunctionBuilder {
    crypto: Option<Box<dyn OuterCrypto>>,
    content: Option<Box<dyn ContentSessions>>,
    registry: Option<Box<dyn DhtRegistry>>,
    router: Option<Box<dyn RouterOracle>>,
    fabric: Option<Box<dyn Fabric>>,
    tun: Option<Box<dyn TunDevice>>,
    session_table: SessionTableConfig,
}

impl JunctionBuilder {
    /// Supply the outer (router-to-router) crypto layer.
    pub fn outer_crypto(mut self, crypto: impl OuterCrypto + 'static) -> Self {
        self.crypto = Some(Box::new(crypto));
        self
    }

    /// Supply the content (end-to-end) session manager.
    pub fn content_sessions(mut self, content: impl ContentSessions + 'static) -> Self {
        self.content = Some(Box::new(content));
        self
    }

    /// Supply the DHT module registry.
    pub fn dht_registry(mut self, registry: impl DhtRegistry + 'static) -> Self {
        self.registry = Some(Box::new(registry));
        self
    }

    /// Supply the DHT routing oracle.
    pub fn router_oracle(mut self, router: impl RouterOracle + 'static) -> Self {
        self.router = Some(Box::new(router));
        self
    }

    /// Supply the fabric switch.
    pub fn fabric(mut self, fabric: impl Fabric + 'static) -> Self {
        self.fabric = Some(Box::new(fabric));
        self
    }

    /// Supply the host-facing TUN device. Without one, packets for us
    /// that are not DHT traffic are dropped as undeliverable.
    pub fn tun_device(mut self, tun: impl TunDevice + 'static) -> Self {
        self.tun = Some(Box::new(tun));
        self
    }

    /// Tune the outer session table.
    pub fn session_table(mut self, config: SessionTableConfig) -> Self {
        self.session_table = config;
        self
    }

    /// Wire everything up and register with the collaborators.
    pub fn build(self) -> Result<Junction> {
        let crypto = self.crypto.ok_or(Error::MissingCollaborator("outer crypto"))?;
        let content = self
            .content
            .ok_or(Error::MissingCollaborator("content sessions"))?;
        let mut registry = self
            .registry
            .ok_or(Error::MissingCollaborator("dht registry"))?;
        let router = self.router.ok_or(Error::MissingCollaborator("router oracle"))?;
        let mut fabric = self.fabric.ok_or(Error::MissingCollaborator("fabric"))?;

        let addr = NodeAddress::from_key(crypto.public_key(), FabricLabel::new(0));

        registry
            .register(DHT_MODULE_NAME)
            .map_err(|err| Error::Registration {
                operation: "dht module registration",
                source: Box::new(err),
            })?;
        fabric.attach_router().map_err(|err| Error::Registration {
            operation: "fabric router attachment",
            source: Box::new(err),
        })?;

        Ok(Junction {
            addr,
            crypto,
            content,
            sessions: SessionTable::new(self.session_table),
            registry,
            router,
            fabric,
            tun: self.tun,
        })
    }
}
