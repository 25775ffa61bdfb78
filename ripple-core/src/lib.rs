//! Ripple Core - peer-to-peer torrent comments
//!
//! This crate implements the `ut_comment` BitTorrent extension: peers attached
//! to the same torrent exchange short comments and 0-5 star ratings. It
//! provides the comment store, the wire codec, the per-connection protocol
//! session, and configuration.

pub mod clock;
pub mod comment;
pub mod config;
pub mod extension;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use comment::{Comment, CommentError, CommentStore, Fingerprint, InfoHash, Rating};
pub use config::{CommentConfig, RippleConfig};
pub use extension::{
    CommentEvent, CommentSession, CommentSessionHandle, PeerEvent, inject_comment,
    spawn_comment_session,
};

/// Core errors that can bubble up from any Ripple subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RippleError {
    #[error("Comment error: {0}")]
    Comment(#[from] CommentError),

    #[error("Logging setup error: {reason}")]
    Logging { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RippleError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            RippleError::Comment(e) => match e {
                CommentError::InvalidRating { rating } => {
                    format!("Ratings go from 0 to 5 stars, got {rating}")
                }
                CommentError::InvalidFingerprint { .. } => {
                    "Torrent fingerprint must be 40 hex characters".to_string()
                }
                CommentError::NoFingerprint | CommentError::SessionInactive => {
                    "Comments are not available for this peer".to_string()
                }
                _ => "Comment exchange error occurred".to_string(),
            },
            RippleError::Logging { .. } => "Logging could not be initialised".to_string(),
            RippleError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RippleError::Comment(
                CommentError::InvalidRating { .. } | CommentError::InvalidFingerprint { .. }
            )
        )
    }
}

pub type Result<T> = std::result::Result<T, RippleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_user_errors() {
        let error = RippleError::from(CommentError::InvalidRating { rating: 9 });
        assert!(error.is_user_error());
        assert_eq!(error.user_message(), "Ratings go from 0 to 5 stars, got 9");

        let error = RippleError::from(CommentError::SessionShutdown);
        assert!(!error.is_user_error());
    }
}
