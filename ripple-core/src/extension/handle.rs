//! Handle for communicating with a comment session actor.

use tokio::sync::{mpsc, oneshot};

use super::actor::SessionCommand;
use super::session::SessionState;
use crate::comment::CommentError;

/// Cloneable async front for a session running under
/// [`spawn_comment_session`](super::spawn_comment_session).
#[derive(Clone)]
pub struct CommentSessionHandle {
    sender: mpsc::Sender<SessionCommand>,
}

impl CommentSessionHandle {
    /// Creates a new handle with the given command sender.
    pub fn new(sender: mpsc::Sender<SessionCommand>) -> Self {
        Self { sender }
    }

    /// Stores a local comment for the session's content.
    ///
    /// # Errors
    /// - `CommentError::NoFingerprint` - Handshake has not happened yet
    /// - `CommentError::InvalidRating` - Rating outside `0..=5`
    /// - `CommentError::SessionShutdown` - Actor has stopped
    pub async fn comment(&self, rating: i64, text: &str) -> Result<(), CommentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = SessionCommand::Comment {
            rating,
            text: text.to_string(),
            responder,
        };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| CommentError::SessionShutdown)?;

        rx.await.map_err(|_| CommentError::SessionShutdown)?
    }

    /// Sends a comment request to the peer immediately.
    ///
    /// # Errors
    /// - `CommentError::SessionInactive` - Peer lacks support or connection closed
    /// - `CommentError::WireClosed` - Connection dropped the message
    /// - `CommentError::SessionShutdown` - Actor has stopped
    pub async fn request(&self) -> Result<(), CommentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = SessionCommand::Request { responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| CommentError::SessionShutdown)?;

        rx.await.map_err(|_| CommentError::SessionShutdown)?
    }

    /// Stops periodic requests. Calling it again has no further effect.
    ///
    /// # Errors
    /// - `CommentError::SessionShutdown` - Actor has stopped
    pub async fn cancel(&self) -> Result<(), CommentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = SessionCommand::Cancel { responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| CommentError::SessionShutdown)?;

        rx.await.map_err(|_| CommentError::SessionShutdown)
    }

    /// Returns the session's protocol state.
    ///
    /// # Errors
    /// - `CommentError::SessionShutdown` - Actor has stopped
    pub async fn state(&self) -> Result<SessionState, CommentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = SessionCommand::State { responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| CommentError::SessionShutdown)?;

        rx.await.map_err(|_| CommentError::SessionShutdown)
    }

    /// Closes the session and stops the actor.
    ///
    /// # Errors
    /// - `CommentError::SessionShutdown` - Actor had already stopped
    pub async fn shutdown(&self) -> Result<(), CommentError> {
        let (responder, rx) = oneshot::channel();
        let cmd = SessionCommand::Shutdown { responder };

        self.sender
            .send(cmd)
            .await
            .map_err(|_| CommentError::SessionShutdown)?;

        rx.await.map_err(|_| CommentError::SessionShutdown)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::comment::{CommentStore, InfoHash};
    use crate::config::CommentConfig;
    use crate::extension::{ChannelWire, CommentSession, PeerEvent, spawn_comment_session};

    fn spawn_session() -> (CommentSessionHandle, mpsc::Sender<PeerEvent>) {
        let (wire, _outbound) = ChannelWire::new();
        let (session, _events) = CommentSession::new(
            CommentConfig::for_testing(),
            Arc::new(wire),
            Arc::new(CommentStore::default()),
        );
        let (peer_sender, peer_receiver) = mpsc::channel(8);
        (spawn_comment_session(session, peer_receiver), peer_sender)
    }

    #[tokio::test]
    async fn test_handle_sees_events_in_order() {
        let (handle, peer_events) = spawn_session();

        assert_eq!(handle.state().await.unwrap(), SessionState::Idle);
        assert_eq!(
            handle.comment(4, "early").await,
            Err(CommentError::NoFingerprint)
        );

        peer_events
            .send(PeerEvent::Handshake {
                info_hash: InfoHash::new([3; 20]),
            })
            .await
            .unwrap();

        // Handshake is queued on a different channel, so poll until it lands
        let mut state = handle.state().await.unwrap();
        while state == SessionState::Idle {
            tokio::task::yield_now().await;
            state = handle.state().await.unwrap();
        }
        assert_eq!(state, SessionState::AwaitingCapability);
        assert!(handle.comment(4, "now bound").await.is_ok());
        assert!(handle.cancel().await.is_ok());
        assert!(handle.cancel().await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_stops_actor() {
        let (handle, _peer_events) = spawn_session();

        handle.shutdown().await.unwrap();

        assert_eq!(handle.state().await, Err(CommentError::SessionShutdown));
        assert_eq!(handle.shutdown().await, Err(CommentError::SessionShutdown));
    }

    #[tokio::test]
    async fn test_connection_close_stops_actor() {
        let (handle, peer_events) = spawn_session();

        drop(peer_events);

        let mut result = handle.state().await;
        while result.is_ok() {
            tokio::task::yield_now().await;
            result = handle.state().await;
        }
        assert_eq!(result, Err(CommentError::SessionShutdown));
    }
}
