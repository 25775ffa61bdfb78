//! Periodic comment requests on active sessions.

use std::time::Duration;

use ripple_core::comment::TimestampPolicy;
use ripple_core::config::CommentConfig;
use ripple_core::extension::{CommentMessage, SessionState};

use crate::peer_pair::PeerPair;

fn refresh_interval() -> Duration {
    CommentConfig::for_testing().refresh_interval
}

fn count_requests(messages: &[ripple_core::extension::OutboundExtended]) -> usize {
    messages
        .iter()
        .filter(|message| {
            matches!(
                CommentMessage::decode(&message.payload),
                Ok(CommentMessage::Request { num: 20, .. })
            )
        })
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_active_sessions_refresh_every_interval() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.connect();
    pair.settle();

    tokio::time::sleep(refresh_interval() / 2).await;
    assert!(pair.a.drain_outbound().is_empty());

    tokio::time::sleep(refresh_interval() * 2).await;
    assert_eq!(count_requests(&pair.a.drain_outbound()), 2);
    assert_eq!(count_requests(&pair.b.drain_outbound()), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_twice_stops_refresh_once() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.connect();
    pair.settle();

    pair.a.session.cancel();
    pair.a.session.cancel();
    assert!(!pair.a.session.is_refresh_armed());
    assert_eq!(pair.a.session.state(), SessionState::Active);

    tokio::time::sleep(refresh_interval() * 2 + Duration::from_secs(1)).await;
    assert!(pair.a.drain_outbound().is_empty());
    assert_eq!(count_requests(&pair.b.drain_outbound()), 2);

    // Manual requests still work after cancelling
    pair.a.session.request().unwrap();
    assert_eq!(count_requests(&pair.a.drain_outbound()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_refresh() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.connect();
    pair.settle();

    pair.b.session.on_close();
    assert_eq!(pair.b.session.state(), SessionState::Closed);

    tokio::time::sleep(refresh_interval() + Duration::from_secs(1)).await;
    assert!(pair.b.drain_outbound().is_empty());
    assert_eq!(count_requests(&pair.a.drain_outbound()), 1);
}
