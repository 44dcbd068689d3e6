//! Shared harness for the junction scenario tests.
//!
//! Provides recording mock collaborators and a structural mock for the
//! two cryptographic layers: "encryption" prepends a fixed tag,
//! "decryption" strips it. That keeps every byte of header stacking
//! observable while staying independent of any real cipher.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::BytesMut;

use ducttape::error::{Error, Result};
use ducttape::junction::{
    ContentEvent, ContentSessions, DhtMessage, DhtRegistry, Fabric, Junction, NodeAddress,
    OuterCrypto, OuterEvent, OuterSession, PublicKey, RouterOracle, TunDevice, derive_ip6,
};
use ducttape::wire::{ADDRESS_PREFIX, Buffer, FabricLabel, Ip6Header, SwitchHeader, UdpHeader};

/// Marker prepended by the mock outer layer.
pub const OUTER_TAG: &[u8; 4] = b"OTR1";
/// Marker prepended by the mock content layer.
pub const INNER_TAG: &[u8; 4] = b"INR1";

/// Seed for the local node's key.
pub const SELF_SEED: u8 = 0x01;

/// Deterministically mine a key whose derived address is inside
/// fc00::/8. About one key in 256 qualifies, so this stays fast.
pub fn mesh_key(seed: u8) -> PublicKey {
    search_key(seed, true)
}

/// Mine a key whose derived address falls *outside* fc00::/8.
pub fn non_mesh_key(seed: u8) -> PublicKey {
    search_key(seed, false)
}

fn search_key(seed: u8, inside: bool) -> PublicKey {
    for nonce in 0..=u16::MAX {
        let mut bytes = [0u8; 32];
        bytes[0] = seed;
        bytes[1..3].copy_from_slice(&nonce.to_le_bytes());
        let key = PublicKey(bytes);
        if (derive_ip6(&key)[0] == ADDRESS_PREFIX) == inside {
            return key;
        }
    }
    unreachable!("no key found for seed {seed}");
}

/// A peer identity reachable over the given fabric label.
pub fn overlay_node(seed: u8, label: u64) -> NodeAddress {
    NodeAddress::from_key(mesh_key(seed), FabricLabel::new(label))
}

// ---------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------

struct MockOuterSession {
    peer: PublicKey,
}

impl OuterSession for MockOuterSession {
    fn her_public_key(&self) -> PublicKey {
        self.peer
    }

    fn encrypt(&mut self, mut msg: Buffer) -> Result<Buffer> {
        msg.push_bytes(OUTER_TAG);
        Ok(msg)
    }

    fn decrypt(&mut self, mut msg: Buffer) -> Result<OuterEvent> {
        if !msg.as_slice().starts_with(OUTER_TAG) {
            return Err(Error::session("outer frame without tag"));
        }
        msg.pop(OUTER_TAG.len())?;
        Ok(OuterEvent::Plaintext(msg))
    }
}

struct MockOuterCrypto {
    ours: PublicKey,
    responder_peer: PublicKey,
    opened: Rc<RefCell<usize>>,
}

impl OuterCrypto for MockOuterCrypto {
    fn public_key(&self) -> PublicKey {
        self.ours
    }

    fn open_initiator(&mut self, peer: &PublicKey) -> Box<dyn OuterSession> {
        *self.opened.borrow_mut() += 1;
        Box::new(MockOuterSession { peer: *peer })
    }

    fn open_responder(&mut self) -> Box<dyn OuterSession> {
        *self.opened.borrow_mut() += 1;
        Box::new(MockOuterSession {
            peer: self.responder_peer,
        })
    }
}

struct MockContentSessions {
    peers: HashMap<[u8; 16], PublicKey>,
    reply: Rc<RefCell<Option<Vec<u8>>>>,
    encrypted_for: Rc<RefCell<Vec<([u8; 16], Option<PublicKey>)>>>,
}

impl ContentSessions for MockContentSessions {
    fn encrypt(
        &mut self,
        peer_ip6: [u8; 16],
        peer_key: Option<&PublicKey>,
        mut msg: Buffer,
    ) -> Result<Buffer> {
        if peer_key.is_none() && !self.peers.contains_key(&peer_ip6) {
            return Err(Error::session("no content session for peer"));
        }
        self.encrypted_for
            .borrow_mut()
            .push((peer_ip6, peer_key.copied()));
        msg.push_bytes(INNER_TAG);
        Ok(msg)
    }

    fn decrypt(&mut self, peer_ip6: [u8; 16], mut msg: Buffer) -> Result<ContentEvent> {
        if let Some(reply) = self.reply.borrow_mut().take() {
            return Ok(ContentEvent::HandshakeReply(Buffer::with_headroom(
                &reply, 128,
            )));
        }
        if !msg.as_slice().starts_with(INNER_TAG) {
            return Err(Error::session("content frame without tag"));
        }
        msg.pop(INNER_TAG.len())?;
        let peer_key = self
            .peers
            .get(&peer_ip6)
            .copied()
            .ok_or_else(|| Error::session("no content session for peer"))?;
        Ok(ContentEvent::Plaintext { msg, peer_key })
    }
}

struct MockFabric {
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
    attached: Rc<RefCell<bool>>,
}

impl Fabric for MockFabric {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.sent.borrow_mut().push(frame.to_vec());
        Ok(())
    }

    fn attach_router(&mut self) -> Result<()> {
        *self.attached.borrow_mut() = true;
        Ok(())
    }
}

struct MockTun {
    sent: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl TunDevice for MockTun {
    fn send(&mut self, packet: &[u8]) -> Result<()> {
        self.sent.borrow_mut().push(packet.to_vec());
        Ok(())
    }
}

struct MockRegistry {
    registered: Rc<RefCell<Vec<&'static str>>>,
    incoming: Rc<RefCell<Vec<(Vec<u8>, NodeAddress)>>>,
}

impl DhtRegistry for MockRegistry {
    fn register(&mut self, name: &'static str) -> Result<()> {
        self.registered.borrow_mut().push(name);
        Ok(())
    }

    fn handle_incoming(&mut self, message: DhtMessage<'_>) -> Result<()> {
        self.incoming
            .borrow_mut()
            .push((message.bytes.to_vec(), message.source));
        Ok(())
    }
}

struct MockRouter {
    next_hop: Rc<RefCell<Option<NodeAddress>>>,
    added: Rc<RefCell<Vec<NodeAddress>>>,
    broken: Rc<RefCell<Vec<FabricLabel>>>,
}

impl RouterOracle for MockRouter {
    fn best_next_hop(&mut self, _destination: &[u8; 16]) -> Option<NodeAddress> {
        self.next_hop.borrow().clone()
    }

    fn add_node(&mut self, node: NodeAddress) {
        self.added.borrow_mut().push(node);
    }

    fn broken_path(&mut self, label: FabricLabel) {
        self.broken.borrow_mut().push(label);
    }
}

// ---------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------

/// Knobs for building a test mesh.
pub struct MeshConfig {
    /// Peer key a responder outer session reports after its handshake.
    pub responder_peer: PublicKey,
    /// Content sessions the manager already holds: address to key.
    pub content_peers: Vec<([u8; 16], PublicKey)>,
    /// Whether the host side has a TUN device.
    pub with_tun: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            responder_peer: mesh_key(0xB0),
            content_peers: Vec::new(),
            with_tun: true,
        }
    }
}

/// A junction wired to recording mocks.
pub struct Mesh {
    pub junction: Junction,
    pub fabric_sent: Rc<RefCell<Vec<Vec<u8>>>>,
    pub fabric_attached: Rc<RefCell<bool>>,
    pub tun_sent: Rc<RefCell<Vec<Vec<u8>>>>,
    pub registered: Rc<RefCell<Vec<&'static str>>>,
    pub dht_incoming: Rc<RefCell<Vec<(Vec<u8>, NodeAddress)>>>,
    pub next_hop: Rc<RefCell<Option<NodeAddress>>>,
    pub added_nodes: Rc<RefCell<Vec<NodeAddress>>>,
    pub broken_paths: Rc<RefCell<Vec<FabricLabel>>>,
    pub opened_outer: Rc<RefCell<usize>>,
    pub content_reply: Rc<RefCell<Option<Vec<u8>>>>,
    pub content_encrypted_for: Rc<RefCell<Vec<([u8; 16], Option<PublicKey>)>>>,
}

impl Mesh {
    /// The local node's overlay address.
    pub fn my_ip6(&self) -> [u8; 16] {
        self.junction.my_address().ip6
    }
}

/// Build a junction from the given config, with tracing wired to the
/// test writer.
pub fn build_mesh(config: MeshConfig) -> Mesh {
    init_tracing();

    let fabric_sent = Rc::new(RefCell::new(Vec::new()));
    let fabric_attached = Rc::new(RefCell::new(false));
    let tun_sent = Rc::new(RefCell::new(Vec::new()));
    let registered = Rc::new(RefCell::new(Vec::new()));
    let dht_incoming = Rc::new(RefCell::new(Vec::new()));
    let next_hop = Rc::new(RefCell::new(None));
    let added_nodes = Rc::new(RefCell::new(Vec::new()));
    let broken_paths = Rc::new(RefCell::new(Vec::new()));
    let opened_outer = Rc::new(RefCell::new(0));
    let content_reply = Rc::new(RefCell::new(None));
    let content_encrypted_for = Rc::new(RefCell::new(Vec::new()));

    let mut builder = Junction::builder()
        .outer_crypto(MockOuterCrypto {
            ours: mesh_key(SELF_SEED),
            responder_peer: config.responder_peer,
            opened: opened_outer.clone(),
        })
        .content_sessions(MockContentSessions {
            peers: config.content_peers.into_iter().collect(),
            reply: content_reply.clone(),
            encrypted_for: content_encrypted_for.clone(),
        })
        .dht_registry(MockRegistry {
            registered: registered.clone(),
            incoming: dht_incoming.clone(),
        })
        .router_oracle(MockRouter {
            next_hop: next_hop.clone(),
            added: added_nodes.clone(),
            broken: broken_paths.clone(),
        })
        .fabric(MockFabric {
            sent: fabric_sent.clone(),
            attached: fabric_attached.clone(),
        });
    if config.with_tun {
        builder = builder.tun_device(MockTun {
            sent: tun_sent.clone(),
        });
    }

    let junction = builder.build().expect("mock collaborators never fail");

    Mesh {
        junction,
        fabric_sent,
        fabric_attached,
        tun_sent,
        registered,
        dht_incoming,
        next_hop,
        added_nodes,
        broken_paths,
        opened_outer,
        content_reply,
        content_encrypted_for,
    }
}

fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ---------------------------------------------------------------------
// Frame construction
// ---------------------------------------------------------------------

/// Build an IPv6 packet `[IP6 | payload]` with a correct length field.
pub fn ip6_packet(
    source: [u8; 16],
    destination: [u8; 16],
    hop_limit: u8,
    next_header: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut header = Ip6Header::new(source, destination, next_header, hop_limit);
    header.set_payload_len(payload.len() as u16);
    let mut packet = header.as_bytes().to_vec();
    packet.extend_from_slice(payload);
    packet
}

/// Wrap `content` the way the mock content layer emits it.
pub fn inner_cipher(content: &[u8]) -> Vec<u8> {
    let mut cipher = INNER_TAG.to_vec();
    cipher.extend_from_slice(content);
    cipher
}

/// `[UDP(0,0) | payload]` as carried by router-to-router traffic.
pub fn dht_content(payload: &[u8]) -> Vec<u8> {
    let mut content = UdpHeader::router_marker(payload.len() as u16)
        .as_bytes()
        .to_vec();
    content.extend_from_slice(payload);
    content
}

/// A data frame as delivered by the fabric: `[Switch | OTR1 | plaintext]`,
/// with the label exactly as it appears on the wire (not yet reversed).
pub fn data_frame(wire_label: u64, plaintext: &[u8]) -> BytesMut {
    let header = SwitchHeader::new(FabricLabel::new(wire_label));
    let mut frame = header.as_bytes().to_vec();
    frame.extend_from_slice(OUTER_TAG);
    frame.extend_from_slice(plaintext);
    BytesMut::from(&frame[..])
}
