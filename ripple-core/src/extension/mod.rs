//! `ut_comment` BitTorrent extension.
//!
//! Peers attached to the same torrent exchange short comments and star
//! ratings over BEP 10 extension messages. Each connection gets a
//! [`CommentSession`]; all sessions share one [`CommentStore`].

pub mod actor;
pub mod handle;
pub mod messages;
pub mod session;
pub mod timer;
pub mod wire;

pub use actor::spawn_comment_session;
pub use handle::CommentSessionHandle;
pub use messages::CommentMessage;
pub use session::{CommentEvent, CommentSession, CommentWarning, ReceivedComment, SessionState};
pub use timer::RefreshTimer;
pub use wire::{ChannelWire, ExtendedWire, ExtensionMap, OutboundExtended, PeerEvent};

use crate::comment::{CommentError, CommentStore, ContentRef};

/// Stores a local comment for content addressed by fingerprint or raw id,
/// without any session or wire traffic.
///
/// # Errors
///
/// - `CommentError::InvalidFingerprint` - If the hex form of `content` is not
///   exactly 40 hex characters
/// - `CommentError::InvalidRating` - If `rating` is outside `0..=5`
pub fn inject_comment<'a>(
    store: &CommentStore,
    content: impl Into<ContentRef<'a>>,
    rating: i64,
    text: impl Into<String>,
) -> Result<(), CommentError> {
    let fingerprint = content.into().fingerprint()?;
    store.add(&fingerprint, rating, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comment::{Fingerprint, InfoHash};

    #[test]
    fn test_inject_by_hex_and_raw_share_a_key() {
        let store = CommentStore::default();
        let info_hash = InfoHash::new([0x0f; 20]);

        inject_comment(&store, info_hash.to_string().as_str(), 4, "hex").unwrap();
        inject_comment(&store, info_hash.as_bytes(), 2, "raw").unwrap();
        inject_comment(&store, &info_hash, 1, "hash").unwrap();

        assert_eq!(store.len_for(&Fingerprint::from(info_hash)), 3);
    }

    #[test]
    fn test_inject_rejects_bad_fingerprint_regardless_of_rating() {
        let store = CommentStore::default();

        for rating in [-1, 0, 3, 5, 6] {
            assert!(matches!(
                inject_comment(&store, "a".repeat(39).as_str(), rating, "x"),
                Err(CommentError::InvalidFingerprint { .. })
            ));
            assert!(matches!(
                inject_comment(&store, [0u8; 19].as_slice(), rating, "x"),
                Err(CommentError::InvalidFingerprint { .. })
            ));
        }
        assert!(store.fingerprints().is_empty());
    }

    #[test]
    fn test_inject_rejects_bad_rating() {
        let store = CommentStore::default();

        assert_eq!(
            inject_comment(&store, "a".repeat(40).as_str(), 6, "x"),
            Err(CommentError::InvalidRating { rating: 6 })
        );
        assert!(inject_comment(&store, "a".repeat(40).as_str(), 0, "x").is_ok());
    }
}
