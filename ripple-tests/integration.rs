//! Integration tests for Ripple
//!
//! These tests run two comment sessions back to back over in-memory
//! connections and check what each side sees: stored comments travelling to
//! the requesting peer, refresh scheduling, and the actor front.

#[path = "support/peer_pair.rs"]
mod peer_pair;

#[path = "integration/comment_exchange.rs"]
mod comment_exchange;
#[path = "integration/refresh_schedule.rs"]
mod refresh_schedule;
#[path = "integration/session_actor.rs"]
mod session_actor;
