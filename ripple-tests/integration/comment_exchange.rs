//! Comment exchange between two connected sessions.

use std::time::Duration;

use bytes::Bytes;
use ripple_core::comment::{Comment, CommentError, Fingerprint, Rating, TimestampPolicy};
use ripple_core::config::COMMENT_EXTENSION_NAME;
use ripple_core::extension::{
    CommentEvent, CommentMessage, CommentWarning, ReceivedComment, SessionState,
};

use crate::peer_pair::{INFO_HASH, PeerPair, START_MILLIS};

fn received(events: Vec<CommentEvent>) -> Vec<ReceivedComment> {
    events
        .into_iter()
        .map(|event| match event {
            CommentEvent::Comment(comment) => comment,
            other => panic!("Expected only comments, got {other:?}"),
        })
        .collect()
}

/// Stores comments on `a` one second apart, then lets one more second pass.
fn seed_comments(pair: &mut PeerPair, comments: &[(i64, &str)]) {
    for (rating, text) in comments {
        pair.a.session.comment(*rating, *text).unwrap();
        pair.clock.advance(Duration::from_secs(1));
    }
}

#[tokio::test(start_paused = true)]
async fn test_requesting_peer_receives_stored_comments() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.a.handshake();
    seed_comments(&mut pair, &[(5, "great"), (3, "fine"), (0, "broken")]);

    pair.b.handshake();
    pair.a.extended_handshake(true);
    pair.b.extended_handshake(true);
    assert!(pair.settle() > 0);

    let comments = received(pair.b.drain_events());
    let texts: Vec<_> = comments.iter().map(|c| c.comment.text.as_str()).collect();
    let ratings: Vec<_> = comments.iter().map(|c| c.comment.rating.as_i64()).collect();
    let ages: Vec<_> = comments.iter().map(|c| c.reported_age_ms).collect();

    assert_eq!(texts, ["great", "fine", "broken"]);
    assert_eq!(ratings, [5, 3, 0]);
    assert_eq!(ages, [3000, 2000, 1000]);

    let expected_fingerprint = Fingerprint::parse(&"a".repeat(40)).unwrap();
    for (offset, comment) in comments.iter().enumerate() {
        assert_eq!(comment.fingerprint.as_ref(), Some(&expected_fingerprint));
        // Reconstructed on the receiver's clock as the creation instant
        assert_eq!(comment.comment.timestamp, START_MILLIS + offset as i64 * 1000);
        assert!(comment.comment.owner.is_empty());
    }

    // `a` asked too, but `b` had nothing: empty responses are silent
    assert!(pair.a.drain_events().is_empty());
    assert_eq!(pair.a.session.last_requested_count(), Some(20));
}

#[tokio::test(start_paused = true)]
async fn test_response_to_bare_request_warns_on_passive_peer() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.a.handshake();
    seed_comments(&mut pair, &[(5, "great"), (3, "fine"), (0, "broken")]);
    pair.b.handshake();

    // A request arrives at `a` without `b` ever having sent one itself
    pair.a.session.on_extended(
        COMMENT_EXTENSION_NAME,
        &CommentMessage::request(20).encode(),
    );
    let replies = pair.a.drain_outbound();
    assert_eq!(replies.len(), 1);
    let Ok(CommentMessage::Response { comments }) = CommentMessage::decode(&replies[0].payload)
    else {
        panic!("Expected a response");
    };
    assert_eq!(comments.len(), 3);
    assert!(comments.iter().all(|comment| comment.timestamp >= 0));

    pair.b.session.on_extended(&replies[0].extension, &replies[0].payload);
    assert_eq!(
        pair.b.drain_events(),
        vec![CommentEvent::Warning(CommentWarning::ResponseBeforeRequest)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_response_is_silent_after_request() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.b.handshake();
    pair.b.extended_handshake(true);
    assert!(pair.b.session.has_requested());

    let empty = CommentMessage::Response {
        comments: Vec::new(),
    };
    pair.b
        .session
        .on_extended(COMMENT_EXTENSION_NAME, &empty.encode());

    assert!(pair.b.drain_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_response_honours_requested_count() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.connect();
    pair.settle();
    seed_comments(&mut pair, &[(1, "first"), (2, "second"), (4, "third")]);

    pair.a.session.on_extended(
        COMMENT_EXTENSION_NAME,
        &CommentMessage::request(2).encode(),
    );
    assert_eq!(pair.a.session.last_requested_count(), Some(2));

    let replies = pair.a.drain_outbound();
    assert_eq!(replies.len(), 1);
    let Ok(CommentMessage::Response { comments }) = CommentMessage::decode(&replies[0].payload)
    else {
        panic!("Expected a response");
    };
    assert_eq!(comments.len(), 2);

    // `b` requested during activation so it accepts the reply
    pair.b.session.on_extended(&replies[0].extension, &replies[0].payload);
    let texts: Vec<_> = received(pair.b.drain_events())
        .into_iter()
        .map(|c| c.comment.text)
        .collect();
    assert_eq!(texts, ["second", "third"]);
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_response_is_rejected_with_warning() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.b.handshake();
    assert!(!pair.b.session.has_requested());

    let response = CommentMessage::Response {
        comments: vec![Comment::new("unasked", Rating::new(4).unwrap(), 10)],
    };
    pair.b
        .session
        .on_extended(COMMENT_EXTENSION_NAME, &response.encode());

    assert_eq!(
        pair.b.drain_events(),
        vec![CommentEvent::Warning(CommentWarning::ResponseBeforeRequest)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_malformed_payloads_emit_one_error_each() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.connect();
    pair.settle();

    let malformed: [&[u8]; 3] = [b"i42e", b"d8:msg_typei0ee", b"d8:msg_typei1ee"];
    for payload in malformed {
        pair.b.session.on_extended(COMMENT_EXTENSION_NAME, payload);
    }

    let events = pair.b.drain_events();
    assert_eq!(events.len(), malformed.len());
    assert!(
        events
            .iter()
            .all(|event| matches!(event, CommentEvent::Error(CommentError::Decode { .. })))
    );
    // Nothing was answered and the session keeps going
    assert!(pair.b.drain_outbound().is_empty());
    assert_eq!(pair.b.session.state(), SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_peer_without_extension_gets_no_requests() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.b.handshake();
    pair.b.extended_handshake(false);

    assert_eq!(pair.b.session.state(), SessionState::Inert);
    assert_eq!(
        pair.b.drain_events(),
        vec![CommentEvent::Warning(CommentWarning::UnsupportedByPeer {
            extension: COMMENT_EXTENSION_NAME.to_string()
        })]
    );
    assert!(pair.b.drain_outbound().is_empty());
    assert!(!pair.b.session.is_refresh_armed());
    assert_eq!(pair.b.session.request(), Err(CommentError::SessionInactive));

    // Stray traffic after the fact is ignored
    pair.b.session.on_extended(
        COMMENT_EXTENSION_NAME,
        &CommentMessage::request(5).encode(),
    );
    assert!(pair.b.drain_outbound().is_empty());
    assert!(pair.b.drain_events().is_empty());

    // Local comments still go to the store
    pair.b.session.comment(2, "offline note").unwrap();
    assert_eq!(pair.b.store.len_for(&INFO_HASH.into()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rewrite_on_read_ages_stored_comments_once() {
    let mut pair = PeerPair::new(TimestampPolicy::RewriteOnRead);
    pair.a.handshake();
    pair.a.session.comment(4, "kept").unwrap();
    pair.clock.advance(Duration::from_millis(5000));

    let request = CommentMessage::request(10).encode();
    let mut ages = Vec::new();
    for _ in 0..2 {
        pair.a.session.on_extended(COMMENT_EXTENSION_NAME, &request);
        for reply in pair.a.drain_outbound() {
            if let Ok(CommentMessage::Response { comments }) = CommentMessage::decode(&reply.payload)
            {
                ages.extend(comments.into_iter().map(|c| c.timestamp));
            }
        }
    }

    // First read stores the age in place of the creation instant
    assert_eq!(ages, [5000, START_MILLIS]);
}

#[tokio::test(start_paused = true)]
async fn test_preserve_creation_ages_are_stable() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.a.handshake();
    pair.a.session.comment(4, "kept").unwrap();
    pair.clock.advance(Duration::from_millis(5000));

    let request = CommentMessage::request(10).encode();
    let mut ages = Vec::new();
    for _ in 0..2 {
        pair.a.session.on_extended(COMMENT_EXTENSION_NAME, &request);
        for reply in pair.a.drain_outbound() {
            if let Ok(CommentMessage::Response { comments }) = CommentMessage::decode(&reply.payload)
            {
                ages.extend(comments.into_iter().map(|c| c.timestamp));
            }
        }
    }

    assert_eq!(ages, [5000, 5000]);
}

#[tokio::test(start_paused = true)]
async fn test_other_extensions_are_left_alone() {
    let mut pair = PeerPair::new(TimestampPolicy::PreserveCreation);
    pair.connect();
    pair.settle();

    pair.b
        .session
        .on_extended("ut_metadata", &Bytes::from_static(b"garbage"));

    assert!(pair.b.drain_events().is_empty());
    assert!(pair.b.drain_outbound().is_empty());
}
