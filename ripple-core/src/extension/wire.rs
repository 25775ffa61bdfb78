//! Contract with the peer connection that carries extension messages.
//!
//! The connection layer owns the socket and the BEP 10 framing. It hands the
//! comment extension [`PeerEvent`]s and exposes [`ExtendedWire`] for sending.

use std::collections::HashMap;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::comment::{CommentError, InfoHash};

/// Extension names a peer advertised in its extended handshake (`m`
/// dictionary), mapped to the message id it assigned.
pub type ExtensionMap = HashMap<String, u8>;

/// Events delivered by the peer connection, in connection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// BitTorrent handshake completed for this content
    Handshake { info_hash: InfoHash },
    /// Peer announced the extensions it supports
    ExtendedHandshake { extensions: ExtensionMap },
    /// Extension message addressed to `extension`
    Extended { extension: String, payload: Bytes },
    /// Connection finished
    Closed,
}

/// Outgoing half of the peer connection as seen by an extension.
pub trait ExtendedWire: Send + Sync {
    /// Queues an extension message for the peer. Must not block.
    ///
    /// # Errors
    ///
    /// - `CommentError::WireClosed` - If the connection is gone
    fn send_extended(&self, extension: &str, payload: Bytes) -> Result<(), CommentError>;
}

/// Extension message queued for the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundExtended {
    pub extension: String,
    pub payload: Bytes,
}

/// [`ExtendedWire`] backed by an unbounded channel drained by the connection
/// writer task.
#[derive(Debug, Clone)]
pub struct ChannelWire {
    sender: mpsc::UnboundedSender<OutboundExtended>,
}

impl ChannelWire {
    /// Creates the wire and the receiver the connection writer drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundExtended>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ExtendedWire for ChannelWire {
    fn send_extended(&self, extension: &str, payload: Bytes) -> Result<(), CommentError> {
        self.sender
            .send(OutboundExtended {
                extension: extension.to_string(),
                payload,
            })
            .map_err(|_| CommentError::WireClosed {
                extension: extension.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_wire_delivers_in_order() {
        let (wire, mut outbound) = ChannelWire::new();

        wire.send_extended("ut_comment", Bytes::from_static(b"one"))
            .unwrap();
        wire.send_extended("ut_comment", Bytes::from_static(b"two"))
            .unwrap();

        assert_eq!(outbound.try_recv().unwrap().payload.as_ref(), b"one");
        assert_eq!(outbound.try_recv().unwrap().payload.as_ref(), b"two");
    }

    #[test]
    fn test_channel_wire_reports_closed_connection() {
        let (wire, outbound) = ChannelWire::new();
        drop(outbound);

        assert_eq!(
            wire.send_extended("ut_comment", Bytes::new()),
            Err(CommentError::WireClosed {
                extension: "ut_comment".to_string()
            })
        );
    }
}
