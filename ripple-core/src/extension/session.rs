//! Per-connection `ut_comment` protocol state machine.
//!
//! A session moves `Idle -> AwaitingCapability -> Active -> Closed`. If the
//! peer does not advertise the extension it parks in `Inert` for the rest of
//! the connection instead. While active it asks the peer for comments right
//! away and again every refresh interval, answers the peer's requests from the
//! shared [`CommentStore`], and forwards received comments to its owner as
//! [`CommentEvent`]s.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::messages::CommentMessage;
use super::timer::RefreshTimer;
use super::wire::{ExtendedWire, ExtensionMap, PeerEvent};
use crate::clock::SharedClock;
use crate::comment::{Comment, CommentError, CommentStore, Fingerprint, InfoHash};
use crate::config::CommentConfig;

/// Protocol state of a comment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the BitTorrent handshake
    Idle,
    /// Fingerprint bound, waiting for the peer's extension map
    AwaitingCapability,
    /// Peer supports `ut_comment`; requests are flowing
    Active,
    /// Peer does not support `ut_comment`; no traffic for this connection
    Inert,
    /// Connection finished
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingCapability => "awaiting-capability",
            SessionState::Active => "active",
            SessionState::Inert => "inert",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Non-fatal protocol conditions reported to the session owner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommentWarning {
    #[error("Peer does not support {extension}")]
    UnsupportedByPeer { extension: String },

    #[error("Peer sent comments before request")]
    ResponseBeforeRequest,
}

/// Comment relayed from a peer.
///
/// `comment.timestamp` is the local clock reading minus the age the peer
/// reported, i.e. the approximate creation instant on this machine's clock.
/// It assumes zero transit time and is advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedComment {
    /// Content the connection is attached to, if the handshake happened
    pub fingerprint: Option<Fingerprint>,
    pub comment: Comment,
    /// Age in milliseconds exactly as the peer sent it
    pub reported_age_ms: i64,
}

/// Everything a session tells its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentEvent {
    /// One comment from a peer response, in payload order
    Comment(ReceivedComment),
    Warning(CommentWarning),
    /// A message that could not be decoded or a reply that could not be sent
    Error(CommentError),
}

/// `ut_comment` endpoint for a single peer connection.
pub struct CommentSession {
    config: CommentConfig,
    wire: Arc<dyn ExtendedWire>,
    store: Arc<CommentStore>,
    clock: SharedClock,
    events: mpsc::UnboundedSender<CommentEvent>,
    state: SessionState,
    fingerprint: Option<Fingerprint>,
    requested: bool,
    last_requested_count: Option<usize>,
    refresh: RefreshTimer,
}

impl CommentSession {
    /// Creates an idle session and the receiver for its events.
    ///
    /// The session reads time from the store's clock so stored ages and
    /// received ages share one time base. Outgoing ages follow the store's
    /// [`TimestampPolicy`](crate::comment::TimestampPolicy), not
    /// `config.timestamp_policy`.
    pub fn new(
        config: CommentConfig,
        wire: Arc<dyn ExtendedWire>,
        store: Arc<CommentStore>,
    ) -> (Self, mpsc::UnboundedReceiver<CommentEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let clock = store.clock();
        let session = Self {
            config,
            wire,
            store,
            clock,
            events,
            state: SessionState::Idle,
            fingerprint: None,
            requested: false,
            last_requested_count: None,
            refresh: RefreshTimer::new(),
        };
        (session, receiver)
    }

    /// Returns the extension name this session answers to.
    pub fn extension_name(&self) -> &str {
        &self.config.extension_name
    }

    /// Returns the current protocol state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the fingerprint bound at handshake.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Whether this side has sent at least one request.
    pub fn has_requested(&self) -> bool {
        self.requested
    }

    /// Comment count asked for by the peer's most recent request.
    pub fn last_requested_count(&self) -> Option<usize> {
        self.last_requested_count
    }

    /// Whether the periodic request is scheduled.
    pub fn is_refresh_armed(&self) -> bool {
        self.refresh.is_armed()
    }

    /// Dispatches one connection event.
    pub fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Handshake { info_hash } => self.on_handshake(info_hash),
            PeerEvent::ExtendedHandshake { extensions } => self.on_extended_handshake(&extensions),
            PeerEvent::Extended { extension, payload } => self.on_extended(&extension, &payload),
            PeerEvent::Closed => self.on_close(),
        }
    }

    /// Binds the peer's content fingerprint.
    pub fn on_handshake(&mut self, info_hash: InfoHash) {
        if self.state != SessionState::Idle {
            tracing::debug!("Ignoring repeated handshake in state {}", self.state);
            return;
        }

        let fingerprint = Fingerprint::from(info_hash);
        tracing::debug!("Comment session bound to {}", fingerprint);
        self.fingerprint = Some(fingerprint);
        self.state = SessionState::AwaitingCapability;
    }

    /// Activates the protocol if the peer advertises it.
    ///
    /// Activation sends the first request immediately and arms the refresh
    /// timer. The timer needs a tokio runtime; without one the session still
    /// activates and emits `CommentError::RefreshUnavailable` instead.
    /// Without support the session becomes inert and emits one
    /// [`CommentWarning::UnsupportedByPeer`].
    pub fn on_extended_handshake(&mut self, extensions: &ExtensionMap) {
        if self.state != SessionState::AwaitingCapability {
            tracing::debug!("Ignoring extended handshake in state {}", self.state);
            return;
        }

        if !extensions.contains_key(&self.config.extension_name) {
            tracing::warn!(
                "Peer for {} does not support {}",
                self.fingerprint_label(),
                self.config.extension_name
            );
            self.state = SessionState::Inert;
            self.emit(CommentEvent::Warning(CommentWarning::UnsupportedByPeer {
                extension: self.config.extension_name.clone(),
            }));
            return;
        }

        self.state = SessionState::Active;
        tracing::debug!("{} active for {}", self.config.extension_name, self.fingerprint_label());

        let request = CommentMessage::request(self.config.request_count);
        if let Err(e) = self.send_request(&request) {
            tracing::warn!("Initial comment request failed: {}", e);
            self.emit(CommentEvent::Error(e));
        }

        if let Err(e) = self.refresh.arm(
            self.config.refresh_interval,
            Arc::clone(&self.wire),
            self.config.extension_name.clone(),
            request.encode(),
        ) {
            self.emit(CommentEvent::Error(e));
        }
    }

    /// Handles an inbound extension message.
    ///
    /// Messages for other extensions, and all messages once the session is
    /// inert or closed, are ignored.
    pub fn on_extended(&mut self, extension: &str, payload: &[u8]) {
        if extension != self.config.extension_name {
            tracing::trace!("Ignoring message for extension {}", extension);
            return;
        }
        if matches!(self.state, SessionState::Inert | SessionState::Closed) {
            tracing::trace!("Ignoring {} message in state {}", extension, self.state);
            return;
        }

        match CommentMessage::decode(payload) {
            Ok(CommentMessage::Request { num, .. }) => self.handle_request(num),
            Ok(CommentMessage::Response { comments }) => self.handle_response(comments),
            Ok(CommentMessage::Unknown { msg_type }) => {
                tracing::trace!("Ignoring {} msg_type {}", extension, msg_type);
            }
            Err(e) => {
                tracing::debug!("Dropping malformed {} message: {}", extension, e);
                self.emit(CommentEvent::Error(e));
            }
        }
    }

    /// Stops the refresh timer and finishes the session.
    pub fn on_close(&mut self) {
        self.refresh.cancel();
        if self.state != SessionState::Closed {
            tracing::debug!("Comment session for {} closed", self.fingerprint_label());
        }
        self.state = SessionState::Closed;
    }

    /// Stops periodic requests without closing the session.
    pub fn cancel(&mut self) {
        if self.refresh.cancel() {
            tracing::debug!("Comment refresh cancelled for {}", self.fingerprint_label());
        }
    }

    /// Sends a request now. The refresh schedule is left as it is.
    ///
    /// # Errors
    ///
    /// - `CommentError::SessionInactive` - If the peer lacks support or the
    ///   connection is closed
    /// - `CommentError::WireClosed` - If the connection dropped the message
    pub fn request(&mut self) -> Result<(), CommentError> {
        if matches!(self.state, SessionState::Inert | SessionState::Closed) {
            return Err(CommentError::SessionInactive);
        }
        self.send_request(&CommentMessage::request(self.config.request_count))
    }

    /// Stores a local comment for this connection's content.
    ///
    /// # Errors
    ///
    /// - `CommentError::NoFingerprint` - If the handshake has not happened
    /// - `CommentError::InvalidRating` - If `rating` is outside `0..=5`
    pub fn comment(&self, rating: i64, text: impl Into<String>) -> Result<(), CommentError> {
        let fingerprint = self.fingerprint.as_ref().ok_or(CommentError::NoFingerprint)?;
        self.store.add(fingerprint, rating, text)
    }

    fn handle_request(&mut self, num: usize) {
        self.last_requested_count = Some(num);

        let comments = self
            .fingerprint
            .as_ref()
            .map(|fingerprint| self.store.recent_for(fingerprint, num))
            .unwrap_or_default();
        tracing::trace!(
            "Answering request for {} comments with {}",
            num,
            comments.len()
        );

        let response = CommentMessage::Response { comments };
        if let Err(e) = self.send(&response) {
            tracing::warn!("Comment response failed: {}", e);
            self.emit(CommentEvent::Error(e));
        }
    }

    fn handle_response(&mut self, comments: Vec<Comment>) {
        if !self.requested {
            tracing::warn!(
                "Peer for {} sent comments before request",
                self.fingerprint_label()
            );
            self.emit(CommentEvent::Warning(CommentWarning::ResponseBeforeRequest));
            return;
        }
        if comments.is_empty() {
            return;
        }

        let now = self.clock.now_millis();
        tracing::debug!(
            "Received {} comments for {}",
            comments.len(),
            self.fingerprint_label()
        );

        for mut comment in comments {
            let reported_age_ms = comment.timestamp;
            comment.timestamp = now.saturating_sub(reported_age_ms);
            self.emit(CommentEvent::Comment(ReceivedComment {
                fingerprint: self.fingerprint.clone(),
                comment,
                reported_age_ms,
            }));
        }
    }

    fn send_request(&mut self, request: &CommentMessage) -> Result<(), CommentError> {
        self.send(request)?;
        self.requested = true;
        Ok(())
    }

    fn send(&self, message: &CommentMessage) -> Result<(), CommentError> {
        self.wire
            .send_extended(&self.config.extension_name, message.encode())
    }

    fn emit(&self, event: CommentEvent) {
        // Owner may have stopped listening; the protocol carries on regardless
        let _ = self.events.send(event);
    }

    fn fingerprint_label(&self) -> &str {
        self.fingerprint
            .as_ref()
            .map_or("<unbound>", Fingerprint::as_str)
    }
}

impl fmt::Debug for CommentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentSession")
            .field("state", &self.state)
            .field("fingerprint", &self.fingerprint)
            .field("requested", &self.requested)
            .field("last_requested_count", &self.last_requested_count)
            .field("refresh_armed", &self.refresh.is_armed())
            .finish()
    }
}
