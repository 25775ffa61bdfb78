//! Content identifiers used to key comments.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::CommentError;

/// Length of the textual fingerprint form.
pub const FINGERPRINT_HEX_LEN: usize = 40;

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary, delivered to the comment
/// extension by the peer handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub const fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Lower-case 40 character hex form of an [`InfoHash`].
///
/// This is the key of the comment store. Every constructor guarantees exactly
/// 40 lower-case hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parses the textual form, normalising to lower case.
    ///
    /// # Errors
    ///
    /// - `CommentError::InvalidFingerprint` - If `hex` is not 40 hex digits
    pub fn parse(hex: &str) -> Result<Self, CommentError> {
        if hex.len() != FINGERPRINT_HEX_LEN {
            return Err(CommentError::InvalidFingerprint {
                reason: format!(
                    "expected {FINGERPRINT_HEX_LEN} hex characters, got {}",
                    hex.len()
                ),
            });
        }
        if !hex.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Err(CommentError::InvalidFingerprint {
                reason: format!("non-hex character in {hex:?}"),
            });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Hex-encodes raw identifier bytes.
    ///
    /// # Errors
    ///
    /// - `CommentError::InvalidFingerprint` - If `raw` is not 20 bytes long
    pub fn from_raw(raw: &[u8]) -> Result<Self, CommentError> {
        Self::parse(&hex::encode(raw))
    }

    /// Returns the hex text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<InfoHash> for Fingerprint {
    fn from(info_hash: InfoHash) -> Self {
        Self(hex::encode(info_hash.as_bytes()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CommentError;

    fn try_from(hex: String) -> Result<Self, Self::Error> {
        Self::parse(&hex)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content addressed either by its hex fingerprint or its raw identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentRef<'a> {
    /// Textual fingerprint, expected to be 40 hex characters
    Hex(&'a str),
    /// Raw identifier bytes, hex-encoded before use
    Raw(&'a [u8]),
}

impl ContentRef<'_> {
    /// Resolves to a validated store key.
    ///
    /// # Errors
    ///
    /// - `CommentError::InvalidFingerprint` - If the hex form is not 40 hex digits
    pub fn fingerprint(self) -> Result<Fingerprint, CommentError> {
        match self {
            ContentRef::Hex(hex) => Fingerprint::parse(hex),
            ContentRef::Raw(raw) => Fingerprint::from_raw(raw),
        }
    }
}

impl<'a> From<&'a str> for ContentRef<'a> {
    fn from(hex: &'a str) -> Self {
        ContentRef::Hex(hex)
    }
}

impl<'a> From<&'a [u8]> for ContentRef<'a> {
    fn from(raw: &'a [u8]) -> Self {
        ContentRef::Raw(raw)
    }
}

impl<'a> From<&'a [u8; 20]> for ContentRef<'a> {
    fn from(raw: &'a [u8; 20]) -> Self {
        ContentRef::Raw(raw)
    }
}

impl<'a> From<&'a InfoHash> for ContentRef<'a> {
    fn from(info_hash: &'a InfoHash) -> Self {
        ContentRef::Raw(info_hash.as_bytes())
    }
}
