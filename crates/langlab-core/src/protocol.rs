//! JSON frames exchanged over a channel.
//!
//! Inbound:
//! - `{ "type": "auth", "token": "<jwt>" }`
//! - `{ "type": "broadcast", "url": "/uploads/lesson1.mp3" }`
//!
//! Outbound:
//! - `{ "type": "presence", "userId": "student1", "online": true }`
//! - `{ "type": "broadcast", "url": "/uploads/lesson1.mp3", "from": "teacher1" }`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::UserId;

/// Errors decoding or encoding a frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not valid JSON, unknown `type`, or a missing field.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Binary frame that is not UTF-8.
    #[error("frame is not valid UTF-8")]
    NotUtf8,
}

/// A message received from a client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    /// Identity message carrying a signed token.
    Auth {
        /// Token issued by the login layer.
        token: String,
    },
    /// Request to push a lesson URL to every connected peer.
    Broadcast {
        /// Lesson media URL.
        url: String,
    },
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a binary frame holding UTF-8 JSON.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        Self::parse(text)
    }

    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

/// A message sent to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    /// A user's online status changed.
    Presence {
        /// The user whose status changed.
        #[serde(rename = "userId")]
        user_id: UserId,
        /// New status.
        online: bool,
    },
    /// A lesson broadcast.
    Broadcast {
        /// Lesson media URL.
        url: String,
        /// Sender user ID.
        from: UserId,
    },
}

impl OutboundMessage {
    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A broadcast in flight. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastMessage {
    /// Who triggered it.
    pub sender: UserId,
    /// Lesson media URL.
    pub url: String,
    /// When the router accepted it.
    pub timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    /// Stamp a new broadcast with the current time.
    pub fn new(sender: UserId, url: impl Into<String>) -> Self {
        Self {
            sender,
            url: url.into(),
            timestamp: Utc::now(),
        }
    }

    /// The frame delivered to recipients.
    pub fn to_outbound(&self) -> OutboundMessage {
        OutboundMessage::Broadcast {
            url: self.url.clone(),
            from: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn parse_auth() {
        let msg = InboundMessage::parse(r#"{"type":"auth","token":"abc"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Auth { token: "abc".into() });
        assert_eq!(msg.kind(), "auth");
    }

    #[test]
    fn parse_broadcast() {
        let msg =
            InboundMessage::parse(r#"{"type":"broadcast","url":"/uploads/lesson1.mp3"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Broadcast {
                url: "/uploads/lesson1.mp3".into()
            }
        );
    }

    #[test]
    fn extra_fields_are_ignored() {
        let msg =
            InboundMessage::parse(r#"{"type":"auth","token":"t","identity":"x"}"#).unwrap();
        assert_eq!(msg.kind(), "auth");
    }

    #[test]
    fn unknown_type_is_malformed() {
        let err = InboundMessage::parse(r#"{"type":"hello","identity":"bob"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn missing_field_is_malformed() {
        assert!(InboundMessage::parse(r#"{"type":"broadcast"}"#).is_err());
        assert!(InboundMessage::parse(r#"{"type":"auth","token":null}"#).is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(InboundMessage::parse("not json").is_err());
        assert!(InboundMessage::parse("").is_err());
        assert!(InboundMessage::parse("[1,2]").is_err());
    }

    #[test]
    fn binary_frames() {
        let msg = InboundMessage::parse_bytes(br#"{"type":"auth","token":"t"}"#).unwrap();
        assert_eq!(msg.kind(), "auth");
        let err = InboundMessage::parse_bytes(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ProtocolError::NotUtf8));
    }

    #[test]
    fn presence_wire_shape() {
        let json = OutboundMessage::Presence {
            user_id: "student1".into(),
            online: true,
        }
        .to_json()
        .unwrap();
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["type"], "presence");
        assert_eq!(v["userId"], "student1");
        assert_eq!(v["online"], true);
        assert_eq!(v.as_object().unwrap().len(), 3);
    }

    #[test]
    fn broadcast_wire_shape() {
        let msg = BroadcastMessage::new("teacher1".into(), "/uploads/lesson1.mp3");
        let v: Value = serde_json::from_str(&msg.to_outbound().to_json().unwrap()).unwrap();
        assert_eq!(v["type"], "broadcast");
        assert_eq!(v["url"], "/uploads/lesson1.mp3");
        assert_eq!(v["from"], "teacher1");
        assert_eq!(v.as_object().unwrap().len(), 3);
    }
}
