//! In-memory comment store keyed by content fingerprint.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Comment, CommentError, Fingerprint, Rating};
use crate::clock::{SharedClock, SystemClock};
use crate::config::CommentConfig;

/// How stored creation instants are turned into ages when read for a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampPolicy {
    /// Write the computed age back into the stored comment. After the first
    /// read the stored value is an age, no longer a creation instant, which
    /// matches the behaviour of existing `ut_comment` peers.
    #[default]
    RewriteOnRead,
    /// Keep the creation instant and compute a fresh age on every read.
    PreserveCreation,
}

impl TimestampPolicy {
    /// Produces the outgoing copy of `stored` with its timestamp as an age.
    ///
    /// Under [`TimestampPolicy::RewriteOnRead`] `stored` is modified in place.
    pub fn age_for_read(self, stored: &mut Comment, now_millis: i64) -> Comment {
        let age = now_millis.saturating_sub(stored.timestamp).max(0);
        match self {
            TimestampPolicy::RewriteOnRead => {
                stored.timestamp = age;
                stored.clone()
            }
            TimestampPolicy::PreserveCreation => Comment {
                timestamp: age,
                ..stored.clone()
            },
        }
    }
}

/// Comment sequences per fingerprint, oldest first.
///
/// Shared by every session of the process through an `Arc`. Appends and the
/// rewrite-on-read both run under one lock. Entries are never evicted.
pub struct CommentStore {
    comments: Mutex<HashMap<Fingerprint, Vec<Comment>>>,
    clock: SharedClock,
    policy: TimestampPolicy,
}

impl CommentStore {
    /// Creates an empty store reading time from `clock`.
    pub fn new(clock: SharedClock, policy: TimestampPolicy) -> Self {
        Self {
            comments: Mutex::new(HashMap::new()),
            clock,
            policy,
        }
    }

    /// Creates an empty store on the system clock with the default policy.
    pub fn with_system_clock() -> Self {
        Self::new(Arc::new(SystemClock), TimestampPolicy::default())
    }

    /// Creates an empty store on the system clock with the configured policy.
    pub fn from_config(config: &CommentConfig) -> Self {
        Self::new(Arc::new(SystemClock), config.timestamp_policy)
    }

    /// Returns the timestamp policy in effect.
    pub fn policy(&self) -> TimestampPolicy {
        self.policy
    }

    /// Returns the clock used to stamp and age comments.
    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    /// Appends an anonymous comment stamped with the current time.
    ///
    /// # Errors
    ///
    /// - `CommentError::InvalidRating` - If `rating` is outside `0..=5`; the
    ///   store is left untouched
    pub fn add(
        &self,
        fingerprint: &Fingerprint,
        rating: i64,
        text: impl Into<String>,
    ) -> Result<(), CommentError> {
        let rating = Rating::new(rating)?;
        let comment = Comment::new(text, rating, self.clock.now_millis());

        let mut comments = self.comments.lock();
        let sequence = comments.entry(fingerprint.clone()).or_default();
        sequence.push(comment);

        tracing::trace!(
            "Stored comment #{} for {} ({})",
            sequence.len(),
            fingerprint,
            rating
        );
        Ok(())
    }

    /// Returns up to `limit` most recent comments, oldest first, with their
    /// timestamps converted to ages.
    pub fn recent_for(&self, fingerprint: &Fingerprint, limit: usize) -> Vec<Comment> {
        let now = self.clock.now_millis();
        let mut comments = self.comments.lock();
        let Some(sequence) = comments.get_mut(fingerprint) else {
            return Vec::new();
        };

        let start = sequence.len().saturating_sub(limit);
        sequence[start..]
            .iter_mut()
            .map(|stored| self.policy.age_for_read(stored, now))
            .collect()
    }

    /// Number of comments stored for `fingerprint`.
    pub fn len_for(&self, fingerprint: &Fingerprint) -> usize {
        self.comments
            .lock()
            .get(fingerprint)
            .map_or(0, |sequence| sequence.len())
    }

    /// Fingerprints with at least one stored comment.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        let mut keys: Vec<_> = self.comments.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for CommentStore {
    fn default() -> Self {
        Self::with_system_clock()
    }
}

impl std::fmt::Debug for CommentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentStore")
            .field("fingerprints", &self.comments.lock().len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::clock::ManualClock;

    fn fingerprint(byte: u8) -> Fingerprint {
        Fingerprint::from_raw(&[byte; 20]).unwrap()
    }

    fn store_with(policy: TimestampPolicy) -> (CommentStore, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (CommentStore::new(Arc::new(clock.clone()), policy), clock)
    }

    #[test]
    fn test_add_rejects_out_of_range_rating() {
        let (store, _) = store_with(TimestampPolicy::default());
        let key = fingerprint(1);

        assert_eq!(
            store.add(&key, -1, "bad"),
            Err(CommentError::InvalidRating { rating: -1 })
        );
        assert!(store.add(&key, 6, "bad").is_err());
        assert!(store.fingerprints().is_empty());
    }

    #[test]
    fn test_add_accepts_boundaries() {
        let (store, _) = store_with(TimestampPolicy::default());
        let key = fingerprint(1);

        assert!(store.add(&key, 0, "meh").is_ok());
        assert!(store.add(&key, 5, "great").is_ok());
        assert_eq!(store.len_for(&key), 2);
    }

    #[test]
    fn test_from_config_uses_configured_policy() {
        let store = CommentStore::from_config(&CommentConfig::for_testing());
        assert_eq!(store.policy(), TimestampPolicy::PreserveCreation);

        let store = CommentStore::from_config(&CommentConfig::default());
        assert_eq!(store.policy(), TimestampPolicy::RewriteOnRead);
    }

    #[test]
    fn test_recent_for_unknown_fingerprint_is_empty() {
        let (store, _) = store_with(TimestampPolicy::default());
        assert!(store.recent_for(&fingerprint(9), 20).is_empty());
        assert_eq!(store.len_for(&fingerprint(9)), 0);
    }

    #[test]
    fn test_recent_for_keeps_most_recent_in_order() {
        let (store, _) = store_with(TimestampPolicy::default());
        let key = fingerprint(2);
        for index in 0..5 {
            store.add(&key, index, format!("comment {index}")).unwrap();
        }

        let texts: Vec<_> = store
            .recent_for(&key, 3)
            .into_iter()
            .map(|comment| comment.text)
            .collect();
        assert_eq!(texts, vec!["comment 2", "comment 3", "comment 4"]);
    }

    #[test]
    fn test_recent_for_zero_limit() {
        let (store, _) = store_with(TimestampPolicy::default());
        let key = fingerprint(2);
        store.add(&key, 3, "only").unwrap();

        assert!(store.recent_for(&key, 0).is_empty());
    }

    #[test]
    fn test_rewrite_on_read_replaces_stored_creation_time() {
        let (store, clock) = store_with(TimestampPolicy::RewriteOnRead);
        let key = fingerprint(3);
        store.add(&key, 4, "first").unwrap();

        clock.advance(Duration::from_millis(1_500));
        let first = store.recent_for(&key, 20);
        assert_eq!(first[0].timestamp, 1_500);

        // The stored value is now an age, so the next read measures from it
        clock.advance(Duration::from_millis(500));
        let second = store.recent_for(&key, 20);
        assert_eq!(second[0].timestamp, 1_002_000 - 1_500);
    }

    #[test]
    fn test_preserve_creation_computes_fresh_age() {
        let (store, clock) = store_with(TimestampPolicy::PreserveCreation);
        let key = fingerprint(3);
        store.add(&key, 4, "first").unwrap();

        clock.advance(Duration::from_millis(1_500));
        assert_eq!(store.recent_for(&key, 20)[0].timestamp, 1_500);

        clock.advance(Duration::from_millis(500));
        assert_eq!(store.recent_for(&key, 20)[0].timestamp, 2_000);
    }

    #[test]
    fn test_age_never_negative() {
        let (store, clock) = store_with(TimestampPolicy::PreserveCreation);
        let key = fingerprint(4);
        store.add(&key, 1, "future").unwrap();

        clock.set(0);
        assert_eq!(store.recent_for(&key, 1)[0].timestamp, 0);
    }

    #[test]
    fn test_fingerprints_are_isolated() {
        let (store, _) = store_with(TimestampPolicy::default());
        store.add(&fingerprint(1), 1, "one").unwrap();
        store.add(&fingerprint(2), 2, "two").unwrap();

        assert_eq!(store.recent_for(&fingerprint(1), 20).len(), 1);
        assert_eq!(store.fingerprints(), vec![fingerprint(1), fingerprint(2)]);
    }

    proptest! {
        #[test]
        fn recent_for_returns_tail_of_insertions(total in 0usize..40, limit in 0usize..40) {
            let (store, _) = store_with(TimestampPolicy::PreserveCreation);
            let key = fingerprint(7);
            for index in 0..total {
                store.add(&key, (index % 6) as i64, index.to_string()).unwrap();
            }

            let texts: Vec<String> = store
                .recent_for(&key, limit)
                .into_iter()
                .map(|comment| comment.text)
                .collect();
            let expected: Vec<String> = (total.saturating_sub(limit)..total)
                .map(|index| index.to_string())
                .collect();

            prop_assert_eq!(texts.len(), total.min(limit));
            prop_assert_eq!(texts, expected);
        }
    }
}
