//! Comments, ratings and the per-content comment store.
//!
//! A comment is a short text plus a 0-5 star rating attached to a content
//! fingerprint. Comments are created locally through the store and exchanged
//! with peers by the `ut_comment` extension.

pub mod fingerprint;
pub mod store;

use std::fmt;

pub use fingerprint::{ContentRef, Fingerprint, InfoHash};
use serde::{Deserialize, Serialize};
pub use store::{CommentStore, TimestampPolicy};

/// Star rating attached to a comment, always within `0..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    /// Lowest accepted rating.
    pub const MIN: i64 = 0;
    /// Highest accepted rating.
    pub const MAX: i64 = 5;

    /// Validates a raw rating.
    ///
    /// # Errors
    ///
    /// - `CommentError::InvalidRating` - If `rating` is outside `0..=5`
    pub fn new(rating: i64) -> Result<Self, CommentError> {
        if (Self::MIN..=Self::MAX).contains(&rating) {
            Ok(Self(rating as u8))
        } else {
            Err(CommentError::InvalidRating { rating })
        }
    }

    /// Returns the rating as the integer sent on the wire.
    pub fn as_i64(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for Rating {
    type Error = CommentError;

    fn try_from(rating: i64) -> Result<Self, Self::Error> {
        Self::new(rating)
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        rating.as_i64()
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/5", self.0)
    }
}

/// A single user comment about a piece of content.
///
/// `timestamp` holds the creation instant in Unix-epoch milliseconds while
/// the comment sits in the store, and an age in milliseconds once it has been
/// prepared for transmission. See [`TimestampPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Author identifier. No authorship mechanism exists, so this is empty
    /// for locally created comments.
    pub owner: String,
    /// Free-form comment text
    pub text: String,
    /// Star rating, sent on the wire as `like`
    pub rating: Rating,
    /// Creation instant or age in milliseconds
    pub timestamp: i64,
}

impl Comment {
    /// Creates an anonymous comment stamped with `created_at`.
    pub fn new(text: impl Into<String>, rating: Rating, created_at: i64) -> Self {
        Self {
            owner: String::new(),
            text: text.into(),
            rating,
            timestamp: created_at,
        }
    }
}

/// Errors raised by comment validation, the wire codec and sessions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommentError {
    #[error("Failed to decode ut_comment message: {reason}")]
    Decode { reason: String },

    #[error("Rating {rating} is outside 0..=5")]
    InvalidRating { rating: i64 },

    #[error("Invalid content fingerprint: {reason}")]
    InvalidFingerprint { reason: String },

    #[error("Session has no fingerprint bound yet")]
    NoFingerprint,

    #[error("Comment exchange is not available on this connection")]
    SessionInactive,

    #[error("Periodic comment refresh unavailable: {reason}")]
    RefreshUnavailable { reason: String },

    #[error("Peer wire closed while sending {extension} message")]
    WireClosed { extension: String },

    #[error("Comment session has shut down")]
    SessionShutdown,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_ok());
        assert!(Rating::new(5).is_ok());
        assert_eq!(
            Rating::new(-1),
            Err(CommentError::InvalidRating { rating: -1 })
        );
        assert_eq!(Rating::new(6), Err(CommentError::InvalidRating { rating: 6 }));
    }

    #[test]
    fn test_rating_display() {
        assert_eq!(Rating::new(3).unwrap().to_string(), "3/5");
    }

    #[test]
    fn test_comment_new_is_anonymous() {
        let comment = Comment::new("great rip", Rating::new(4).unwrap(), 1_000);

        assert_eq!(comment.owner, "");
        assert_eq!(comment.text, "great rip");
        assert_eq!(comment.rating.as_i64(), 4);
        assert_eq!(comment.timestamp, 1_000);
    }

    #[test]
    fn test_comment_json_rejects_out_of_range_rating() {
        let json = r#"{"owner":"","text":"x","rating":9,"timestamp":0}"#;
        assert!(serde_json::from_str::<Comment>(json).is_err());

        let json = r#"{"owner":"","text":"x","rating":2,"timestamp":0}"#;
        let comment: Comment = serde_json::from_str(json).unwrap();
        assert_eq!(comment.rating.as_i64(), 2);
    }

    proptest! {
        #[test]
        fn rating_accepted_iff_in_range(rating in -1_000i64..1_000) {
            prop_assert_eq!(Rating::new(rating).is_ok(), (0..=5).contains(&rating));
        }
    }
}
