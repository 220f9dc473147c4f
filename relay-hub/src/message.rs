//! Inbound chat messages and rendered outbound frames.
//!
//! Wire format (UTF-8 JSON, one object per WebSocket frame):
//! ```text
//! {"text": "<string>"}
//! ```
//!
//! Extra fields are ignored so browser form serializers (htmx adds a
//! `HEADERS` object) decode cleanly. Anything without a string `text`
//! field is rejected.

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

use crate::error::{HubError, Result};

/// A single submitted chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
}

impl Message {
    /// Create a message from its text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The submitted text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Decode a client payload. Only a JSON object is accepted.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode a client payload, rejecting anything longer than `max_len` bytes
    /// before it reaches the JSON parser.
    pub fn decode_limited(bytes: &[u8], max_len: usize) -> Result<Self> {
        if bytes.len() > max_len {
            return Err(HubError::MessageTooLarge {
                len: bytes.len(),
                max: max_len,
            });
        }
        Self::decode(bytes)
    }
}

// Only a map decodes. Sequences such as `["hi"]` are rejected.
impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(MessageVisitor)
    }
}

struct MessageVisitor;

impl<'de> Visitor<'de> for MessageVisitor {
    type Value = Message;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object with a string `text` field")
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Message, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut text: Option<String> = None;
        while let Some(key) = map.next_key::<String>()? {
            if key == "text" {
                if text.is_some() {
                    return Err(de::Error::duplicate_field("text"));
                }
                text = Some(map.next_value()?);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        let text = text.ok_or_else(|| de::Error::missing_field("text"))?;
        Ok(Message { text })
    }
}

/// A rendered broadcast payload.
///
/// Rendered once per message and shared by every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    /// The rendered text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the frame has no content.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Frame {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for Frame {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
