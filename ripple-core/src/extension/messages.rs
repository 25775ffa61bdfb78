//! `ut_comment` message serialization and deserialization
//!
//! Every message is a single bencoded dictionary discriminated by `msg_type`:
//!
//! - request: `{filter: <64 bytes>, msg_type: 0, num: <count>}`
//! - response: `{comments: [{like, owner, text, timestamp}, ...], msg_type: 1}`
//!
//! Keys are written in sorted order so the output is canonical bencode.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use crate::comment::{Comment, CommentError, Rating};

/// `msg_type` of a comment request.
pub const MSG_TYPE_REQUEST: i64 = 0;
/// `msg_type` of a comment response.
pub const MSG_TYPE_RESPONSE: i64 = 1;
/// Size of the reserved request filter.
pub const FILTER_LEN: usize = 64;

type BencodeDict<'a> = HashMap<&'a [u8], bencode_rs::Value<'a>>;
type DecodeResult<T> = Result<T, CommentError>;

/// Decoded `ut_comment` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentMessage {
    /// Ask the peer for its most recent comments
    Request {
        /// Maximum number of comments wanted
        num: usize,
        /// Reserved selection bitmap, always zero and never interpreted
        filter: Bytes,
    },
    /// Comments sent in answer to a request, timestamps carried as ages
    Response { comments: Vec<Comment> },
    /// Any other `msg_type`; ignored by sessions
    Unknown { msg_type: i64 },
}

impl CommentMessage {
    /// Builds a request with an all-zero filter.
    pub fn request(num: usize) -> Self {
        CommentMessage::Request {
            num,
            filter: Bytes::from_static(&[0u8; FILTER_LEN]),
        }
    }

    /// Serializes the message as canonical bencode.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();

        match self {
            CommentMessage::Request { num, filter } => {
                buf.put_u8(b'd');
                put_bytes(&mut buf, b"filter");
                put_bytes(&mut buf, filter);
                put_bytes(&mut buf, b"msg_type");
                put_integer(&mut buf, MSG_TYPE_REQUEST);
                put_bytes(&mut buf, b"num");
                put_integer(&mut buf, i64::try_from(*num).unwrap_or(i64::MAX));
                buf.put_u8(b'e');
            }
            CommentMessage::Response { comments } => {
                buf.put_u8(b'd');
                put_bytes(&mut buf, b"comments");
                buf.put_u8(b'l');
                for comment in comments {
                    put_comment(&mut buf, comment);
                }
                buf.put_u8(b'e');
                put_bytes(&mut buf, b"msg_type");
                put_integer(&mut buf, MSG_TYPE_RESPONSE);
                buf.put_u8(b'e');
            }
            CommentMessage::Unknown { msg_type } => {
                buf.put_u8(b'd');
                put_bytes(&mut buf, b"msg_type");
                put_integer(&mut buf, *msg_type);
                buf.put_u8(b'e');
            }
        }

        buf.freeze()
    }

    /// Parses a raw extension payload.
    ///
    /// # Errors
    ///
    /// - `CommentError::Decode` - If the payload is not bencode, is not a
    ///   dictionary, or a required field is missing or has the wrong type
    pub fn decode(payload: &[u8]) -> DecodeResult<Self> {
        let parsed = bencode_rs::Value::parse(payload).map_err(|e| CommentError::Decode {
            reason: format!("Bencode parsing failed: {e:?}"),
        })?;

        let root = match parsed.as_slice() {
            [root] => root,
            [] => return Err(decode_error("Empty payload")),
            _ => return Err(decode_error("Trailing data after message dictionary")),
        };
        let bencode_rs::Value::Dictionary(dict) = root else {
            return Err(decode_error("Root element must be dictionary"));
        };

        match extract_integer(dict, b"msg_type")? {
            MSG_TYPE_REQUEST => Self::decode_request(dict),
            MSG_TYPE_RESPONSE => Self::decode_response(dict),
            msg_type => Ok(CommentMessage::Unknown { msg_type }),
        }
    }

    fn decode_request(dict: &BencodeDict<'_>) -> DecodeResult<Self> {
        let num = extract_integer(dict, b"num")?;
        if num < 0 {
            return Err(decode_error(&format!("Negative comment count {num}")));
        }

        let filter = match dict.get(b"filter".as_slice()) {
            Some(bencode_rs::Value::Bytes(filter)) => Bytes::copy_from_slice(filter),
            _ => Bytes::from_static(&[0u8; FILTER_LEN]),
        };

        Ok(CommentMessage::Request {
            num: usize::try_from(num).unwrap_or(usize::MAX),
            filter,
        })
    }

    fn decode_response(dict: &BencodeDict<'_>) -> DecodeResult<Self> {
        let Some(bencode_rs::Value::List(entries)) = dict.get(b"comments".as_slice()) else {
            return Err(decode_error("Missing or invalid field: \"comments\""));
        };

        let comments = entries
            .iter()
            .map(|entry| match entry {
                bencode_rs::Value::Dictionary(comment) => decode_comment(comment),
                _ => Err(decode_error("Invalid comment entry type")),
            })
            .collect::<DecodeResult<Vec<_>>>()?;

        Ok(CommentMessage::Response { comments })
    }
}

fn decode_comment(dict: &BencodeDict<'_>) -> DecodeResult<Comment> {
    let owner = match dict.get(b"owner".as_slice()) {
        None => String::new(),
        Some(_) => extract_string(dict, b"owner")?,
    };
    let text = extract_string(dict, b"text")?;
    let rating = Rating::new(extract_integer(dict, b"like")?).map_err(|e| CommentError::Decode {
        reason: e.to_string(),
    })?;
    let timestamp = extract_integer(dict, b"timestamp")?;

    Ok(Comment {
        owner,
        text,
        rating,
        timestamp,
    })
}

fn decode_error(reason: &str) -> CommentError {
    CommentError::Decode {
        reason: reason.to_string(),
    }
}

fn extract_integer(dict: &BencodeDict<'_>, key: &[u8]) -> DecodeResult<i64> {
    match dict.get(key) {
        Some(bencode_rs::Value::Integer(value)) => Ok(*value),
        _ => Err(CommentError::Decode {
            reason: format!(
                "Missing or invalid integer field: {:?}",
                String::from_utf8_lossy(key)
            ),
        }),
    }
}

fn extract_string(dict: &BencodeDict<'_>, key: &[u8]) -> DecodeResult<String> {
    let bytes = match dict.get(key) {
        Some(bencode_rs::Value::Bytes(bytes)) => *bytes,
        _ => {
            return Err(CommentError::Decode {
                reason: format!(
                    "Missing or invalid field: {:?}",
                    String::from_utf8_lossy(key)
                ),
            });
        }
    };
    String::from_utf8(bytes.to_vec()).map_err(|_| CommentError::Decode {
        reason: format!("Invalid UTF-8 in field: {:?}", String::from_utf8_lossy(key)),
    })
}

fn put_comment(buf: &mut BytesMut, comment: &Comment) {
    buf.put_u8(b'd');
    put_bytes(buf, b"like");
    put_integer(buf, comment.rating.as_i64());
    put_bytes(buf, b"owner");
    put_bytes(buf, comment.owner.as_bytes());
    put_bytes(buf, b"text");
    put_bytes(buf, comment.text.as_bytes());
    put_bytes(buf, b"timestamp");
    put_integer(buf, comment.timestamp);
    buf.put_u8(b'e');
}

fn put_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_slice(bytes.len().to_string().as_bytes());
    buf.put_u8(b':');
    buf.put_slice(bytes);
}

fn put_integer(buf: &mut BytesMut, value: i64) {
    buf.put_u8(b'i');
    buf.put_slice(value.to_string().as_bytes());
    buf.put_u8(b'e');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(text: &str, rating: i64, timestamp: i64) -> Comment {
        Comment::new(text, Rating::new(rating).unwrap(), timestamp)
    }

    #[test]
    fn test_request_wire_format() {
        let encoded = CommentMessage::request(20).encode();

        let mut expected = b"d6:filter64:".to_vec();
        expected.extend_from_slice(&[0u8; FILTER_LEN]);
        expected.extend_from_slice(b"8:msg_typei0e3:numi20ee");
        assert_eq!(encoded.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_response_wire_format() {
        let message = CommentMessage::Response {
            comments: vec![comment("nice", 5, 1200)],
        };

        assert_eq!(
            message.encode().as_ref(),
            b"d8:commentsld4:likei5e5:owner0:4:text4:nice9:timestampi1200eee8:msg_typei1ee"
                .as_slice()
        );
    }

    #[test]
    fn test_request_roundtrip() {
        let decoded = CommentMessage::decode(&CommentMessage::request(7).encode()).unwrap();
        assert_eq!(decoded, CommentMessage::request(7));
    }

    #[test]
    fn test_response_preserves_comment_order() {
        let comments = vec![comment("first", 5, 10), comment("second", 0, 20)];
        let encoded = CommentMessage::Response {
            comments: comments.clone(),
        }
        .encode();

        assert_eq!(
            CommentMessage::decode(&encoded).unwrap(),
            CommentMessage::Response { comments }
        );
    }

    #[test]
    fn test_request_without_filter_is_accepted() {
        let decoded = CommentMessage::decode(b"d8:msg_typei0e3:numi3ee").unwrap();
        assert_eq!(decoded, CommentMessage::request(3));
    }

    #[test]
    fn test_owner_defaults_to_empty() {
        let payload = b"d8:commentsld4:likei2e4:text2:hi9:timestampi5eee8:msg_typei1ee";
        let CommentMessage::Response { comments } = CommentMessage::decode(payload).unwrap()
        else {
            panic!("Expected Response message");
        };
        assert_eq!(comments[0].owner, "");
        assert_eq!(comments[0].text, "hi");
    }

    #[test]
    fn test_unknown_msg_type() {
        assert_eq!(
            CommentMessage::decode(b"d8:msg_typei7ee").unwrap(),
            CommentMessage::Unknown { msg_type: 7 }
        );
    }

    #[test]
    fn test_malformed_payloads_are_decode_errors() {
        let cases: [&[u8]; 10] = [
            b"",
            b"li1ee",
            b"d3:numi20ee",
            b"d8:msg_type1:0e",
            b"d8:msg_typei0ee",
            b"d8:msg_typei0e3:numi-1ee",
            b"d8:msg_typei1ee",
            b"d8:commentsli1ee8:msg_typei1ee",
            b"d8:commentsld4:likei9e4:text1:x9:timestampi0eee8:msg_typei1ee",
            b"d8:commentsld4:likei1e9:timestampi0eee8:msg_typei1ee",
        ];

        for payload in cases {
            assert!(
                matches!(
                    CommentMessage::decode(payload),
                    Err(CommentError::Decode { .. })
                ),
                "payload {:?} should not decode",
                String::from_utf8_lossy(payload)
            );
        }
    }
}
