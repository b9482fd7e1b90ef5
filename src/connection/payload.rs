//! Opaque message payloads carried over a connection.

use std::fmt;

/// A single message exchanged with the server.
///
/// The connection never inspects payload contents; the variant only selects
/// the frame type used on the wire.
#[derive(Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Number of bytes carried by the payload.
    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the payload as text when it is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// Borrow the raw bytes regardless of frame type.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }

    /// Convert into a binary payload, keeping binary frames untouched.
    pub fn into_binary(self) -> Payload {
        match self {
            Payload::Text(text) => Payload::Binary(text.into_bytes()),
            binary => binary,
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Binary(value)
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Payload::Binary(value.to_vec())
    }
}

// Long text and all binary payloads are elided to their size.
impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) if text.len() <= 32 => f.debug_tuple("Text").field(text).finish(),
            Payload::Text(text) => write!(f, "Text(<{} bytes>)", text.len()),
            Payload::Binary(bytes) => write!(f, "Binary(<{} bytes>)", bytes.len()),
        }
    }
}
