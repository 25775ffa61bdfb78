//! Sessions running as actors, bridged by connection tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use ripple_core::comment::CommentStore;
use ripple_core::config::{COMMENT_EXTENSION_NAME, CommentConfig};
use ripple_core::extension::{
    ChannelWire, CommentEvent, CommentSession, CommentSessionHandle, ExtensionMap,
    OutboundExtended, PeerEvent, SessionState, spawn_comment_session,
};
use ripple_core::{CommentError, inject_comment};
use tokio::sync::mpsc;

use crate::peer_pair::INFO_HASH;

struct ActorPeer {
    handle: CommentSessionHandle,
    peer_events: mpsc::Sender<PeerEvent>,
    events: mpsc::UnboundedReceiver<CommentEvent>,
    outbound: mpsc::UnboundedReceiver<OutboundExtended>,
}

fn spawn_peer(store: Arc<CommentStore>) -> ActorPeer {
    let (wire, outbound) = ChannelWire::new();
    let (session, events) =
        CommentSession::new(CommentConfig::for_testing(), Arc::new(wire), store);
    let (peer_events, peer_receiver) = mpsc::channel(16);

    ActorPeer {
        handle: spawn_comment_session(session, peer_receiver),
        peer_events,
        events,
        outbound,
    }
}

/// Forwards one side's outbound messages to the other side's connection.
fn bridge(
    mut outbound: mpsc::UnboundedReceiver<OutboundExtended>,
    peer_events: mpsc::Sender<PeerEvent>,
) {
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let event = PeerEvent::Extended {
                extension: message.extension,
                payload: message.payload,
            };
            if peer_events.send(event).await.is_err() {
                break;
            }
        }
    });
}

async fn open_connection(peer_events: &mpsc::Sender<PeerEvent>) -> Result<()> {
    let mut extensions = ExtensionMap::new();
    extensions.insert(COMMENT_EXTENSION_NAME.to_string(), 7);

    peer_events
        .send(PeerEvent::Handshake {
            info_hash: INFO_HASH,
        })
        .await?;
    peer_events
        .send(PeerEvent::ExtendedHandshake { extensions })
        .await?;
    Ok(())
}

async fn wait_for_state(handle: &CommentSessionHandle, wanted: SessionState) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.state().await? != wanted {
            tokio::task::yield_now().await;
        }
        Ok::<_, CommentError>(())
    })
    .await??;
    Ok(())
}

#[tokio::test]
async fn test_actors_exchange_comments() -> Result<()> {
    let seeded = Arc::new(CommentStore::default());
    inject_comment(&seeded, INFO_HASH.as_bytes(), 5, "seeded")?;

    let mut a = spawn_peer(seeded.clone());
    let mut b = spawn_peer(Arc::new(CommentStore::default()));
    bridge(a.outbound, b.peer_events.clone());
    bridge(b.outbound, a.peer_events.clone());

    open_connection(&a.peer_events).await?;
    open_connection(&b.peer_events).await?;
    wait_for_state(&a.handle, SessionState::Active).await?;
    wait_for_state(&b.handle, SessionState::Active).await?;

    let event = tokio::time::timeout(Duration::from_secs(5), b.events.recv()).await?;
    let Some(CommentEvent::Comment(received)) = event else {
        anyhow::bail!("Expected the seeded comment first");
    };
    assert_eq!(received.comment.text, "seeded");
    assert_eq!(received.comment.rating.as_i64(), 5);
    assert!(received.reported_age_ms >= 0);

    // Comments added through the handle land in the shared store
    a.handle.comment(3, "via handle").await?;
    assert_eq!(seeded.len_for(&INFO_HASH.into()), 2);

    b.handle.request().await?;
    let mut texts = Vec::new();
    while texts.len() < 2 {
        match tokio::time::timeout(Duration::from_secs(5), b.events.recv()).await? {
            Some(CommentEvent::Comment(received)) => texts.push(received.comment.text),
            Some(other) => anyhow::bail!("Unexpected event {other:?}"),
            None => anyhow::bail!("Session stopped early"),
        }
    }
    assert_eq!(texts, ["seeded", "via handle"]);
    assert!(a.events.try_recv().is_err());

    a.handle.shutdown().await?;
    b.peer_events.send(PeerEvent::Closed).await?;
    assert_eq!(a.handle.request().await, Err(CommentError::SessionShutdown));

    Ok(())
}

#[tokio::test]
async fn test_actor_reports_inactive_peer() -> Result<()> {
    let peer = spawn_peer(Arc::new(CommentStore::default()));

    peer.peer_events
        .send(PeerEvent::Handshake {
            info_hash: INFO_HASH,
        })
        .await?;
    peer.peer_events
        .send(PeerEvent::ExtendedHandshake {
            extensions: ExtensionMap::new(),
        })
        .await?;
    wait_for_state(&peer.handle, SessionState::Inert).await?;

    assert_eq!(
        peer.handle.request().await,
        Err(CommentError::SessionInactive)
    );
    peer.handle.cancel().await?;
    peer.handle.cancel().await?;

    Ok(())
}
