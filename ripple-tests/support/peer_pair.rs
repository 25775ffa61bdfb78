//! Two comment sessions connected back to back.

use std::sync::Arc;

use ripple_core::clock::ManualClock;
use ripple_core::comment::{CommentStore, InfoHash, TimestampPolicy};
use ripple_core::config::{COMMENT_EXTENSION_NAME, CommentConfig};
use ripple_core::extension::{
    ChannelWire, CommentEvent, CommentSession, ExtensionMap, OutboundExtended,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub const START_MILLIS: i64 = 1_700_000_000_000;

/// Torrent both peers are attached to; its fingerprint is forty `a`s.
pub const INFO_HASH: InfoHash = InfoHash::new([0xaa; 20]);

/// One side of a connection with its own store.
pub struct TestPeer {
    pub session: CommentSession,
    pub events: UnboundedReceiver<CommentEvent>,
    pub outbound: UnboundedReceiver<OutboundExtended>,
    pub store: Arc<CommentStore>,
}

impl TestPeer {
    pub fn new(clock: &ManualClock, policy: TimestampPolicy) -> Self {
        let store = Arc::new(CommentStore::new(Arc::new(clock.clone()), policy));
        let (wire, outbound) = ChannelWire::new();
        let (session, events) =
            CommentSession::new(CommentConfig::for_testing(), Arc::new(wire), store.clone());

        Self {
            session,
            events,
            outbound,
            store,
        }
    }

    /// Completes the base handshake for [`INFO_HASH`].
    pub fn handshake(&mut self) {
        self.session.on_handshake(INFO_HASH);
    }

    /// Completes the extended handshake with a peer that does or does not
    /// advertise `ut_comment`.
    pub fn extended_handshake(&mut self, peer_supports_comments: bool) {
        let mut extensions = ExtensionMap::new();
        extensions.insert("ut_metadata".to_string(), 2);
        if peer_supports_comments {
            extensions.insert(COMMENT_EXTENSION_NAME.to_string(), 3);
        }
        self.session.on_extended_handshake(&extensions);
    }

    pub fn drain_events(&mut self) -> Vec<CommentEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn drain_outbound(&mut self) -> Vec<OutboundExtended> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Two peers on one pinned clock.
pub struct PeerPair {
    pub clock: ManualClock,
    pub a: TestPeer,
    pub b: TestPeer,
}

impl PeerPair {
    pub fn new(policy: TimestampPolicy) -> Self {
        let clock = ManualClock::new(START_MILLIS);
        let a = TestPeer::new(&clock, policy);
        let b = TestPeer::new(&clock, policy);
        Self { clock, a, b }
    }

    /// Both sides handshake and advertise `ut_comment`. Each sends its first
    /// request, which stays queued until delivered.
    pub fn connect(&mut self) {
        self.a.handshake();
        self.b.handshake();
        self.a.extended_handshake(true);
        self.b.extended_handshake(true);
    }

    /// Delivers queued messages in both directions until both sides go quiet.
    /// Returns how many messages were delivered.
    pub fn settle(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let round = deliver(&mut self.a, &mut self.b) + deliver(&mut self.b, &mut self.a);
            if round == 0 {
                return delivered;
            }
            delivered += round;
        }
    }
}

/// Hands everything `from` queued to `to`.
pub fn deliver(from: &mut TestPeer, to: &mut TestPeer) -> usize {
    let messages = from.drain_outbound();
    for message in &messages {
        to.session.on_extended(&message.extension, &message.payload);
    }
    messages.len()
}
