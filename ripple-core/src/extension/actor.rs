//! Actor running a comment session on its own task.
//!
//! Connection events and handle commands are processed one at a time, in
//! arrival order, so the session never needs a lock.

use tokio::sync::{mpsc, oneshot};

use super::handle::CommentSessionHandle;
use super::session::{CommentSession, SessionState};
use super::wire::PeerEvent;
use crate::comment::CommentError;

/// Capacity of the handle command channel.
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Commands that can be sent to a session actor.
///
/// Each command carries a response channel for the result.
pub enum SessionCommand {
    /// Store a local comment for the session's content.
    Comment {
        rating: i64,
        text: String,
        responder: oneshot::Sender<Result<(), CommentError>>,
    },
    /// Send a request to the peer now.
    Request {
        responder: oneshot::Sender<Result<(), CommentError>>,
    },
    /// Stop periodic requests.
    Cancel { responder: oneshot::Sender<()> },
    /// Report the protocol state.
    State {
        responder: oneshot::Sender<SessionState>,
    },
    /// Close the session and stop the actor.
    Shutdown { responder: oneshot::Sender<()> },
}

/// Spawns the session actor and returns its handle.
///
/// The actor stops after `PeerEvent::Closed`, when the connection drops its
/// event sender, or on [`CommentSessionHandle::shutdown`]. In every case the
/// session is closed first so the refresh timer cannot outlive it.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// use std::sync::Arc;
///
/// use ripple_core::comment::CommentStore;
/// use ripple_core::config::CommentConfig;
/// use ripple_core::extension::{spawn_comment_session, ChannelWire, CommentSession};
///
/// let store = Arc::new(CommentStore::default());
/// let (wire, _outbound) = ChannelWire::new();
/// let (session, _events) = CommentSession::new(CommentConfig::default(), Arc::new(wire), store);
/// let (_peer_events, peer_receiver) = tokio::sync::mpsc::channel(16);
/// let handle = spawn_comment_session(session, peer_receiver);
/// # }
/// ```
pub fn spawn_comment_session(
    session: CommentSession,
    peer_events: mpsc::Receiver<PeerEvent>,
) -> CommentSessionHandle {
    let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        run_actor_loop(session, receiver, peer_events).await;
    });

    CommentSessionHandle::new(sender)
}

async fn run_actor_loop(
    mut session: CommentSession,
    mut commands: mpsc::Receiver<SessionCommand>,
    mut peer_events: mpsc::Receiver<PeerEvent>,
) {
    tracing::debug!("Comment session actor started");

    loop {
        tokio::select! {
            Some(command) = commands.recv() => {
                if !handle_command(&mut session, command) {
                    break;
                }
            }
            event = peer_events.recv() => match event {
                Some(PeerEvent::Closed) | None => {
                    session.on_close();
                    break;
                }
                Some(event) => session.handle_event(event),
            },
        }
    }

    tracing::debug!("Comment session actor stopped");
}

/// Handles a single command. Returns false to stop the actor.
fn handle_command(session: &mut CommentSession, command: SessionCommand) -> bool {
    match command {
        SessionCommand::Comment {
            rating,
            text,
            responder,
        } => {
            let _ = responder.send(session.comment(rating, text));
        }

        SessionCommand::Request { responder } => {
            let _ = responder.send(session.request());
        }

        SessionCommand::Cancel { responder } => {
            session.cancel();
            let _ = responder.send(());
        }

        SessionCommand::State { responder } => {
            let _ = responder.send(session.state());
        }

        SessionCommand::Shutdown { responder } => {
            tracing::debug!("Comment session actor shutting down");
            session.on_close();
            let _ = responder.send(());
            return false;
        }
    }

    true
}
