//! WebSocket frame codec.
//!
//! Inbound frames are JSON objects discriminated by `type`:
//!
//! ```text
//! {"type": "group_message", "data": {...message...}}
//! {"type": "message",       "data": {...message...}}
//! {"type": "user_offline",  "userId": "..."}
//! ```
//!
//! They are decoded once, here, into [`InboundEvent`]. Nothing past the
//! transport boundary looks at raw JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{GroupId, Message, UserId};

const GROUP_MESSAGE: &str = "group_message";
const DIRECT_MESSAGE: &str = "message";
const USER_OFFLINE: &str = "user_offline";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("not valid JSON: {0}")]
    InvalidJson(String),

    #[error("frame has no type")]
    MissingType,

    #[error("unknown frame type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} frame: {reason}")]
    Malformed { kind: String, reason: String },
}

/// A decoded server-to-client event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    GroupMessage(Message),
    DirectMessage(Message),
    UserOffline { user_id: UserId },
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum WireInbound {
    #[serde(rename = "group_message")]
    GroupMessage { data: Message },
    #[serde(rename = "message")]
    DirectMessage { data: Message },
    #[serde(rename = "user_offline")]
    UserOffline {
        #[serde(rename = "userId")]
        user_id: UserId,
    },
}

impl From<WireInbound> for InboundEvent {
    fn from(wire: WireInbound) -> Self {
        match wire {
            WireInbound::GroupMessage { data } => InboundEvent::GroupMessage(data),
            WireInbound::DirectMessage { data } => InboundEvent::DirectMessage(data),
            WireInbound::UserOffline { user_id } => InboundEvent::UserOffline { user_id },
        }
    }
}

impl InboundEvent {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if ![GROUP_MESSAGE, DIRECT_MESSAGE, USER_OFFLINE].contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        serde_json::from_value::<WireInbound>(value)
            .map(InboundEvent::from)
            .map_err(|e| ProtocolError::Malformed {
                kind,
                reason: e.to_string(),
            })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::GroupMessage(_) => GROUP_MESSAGE,
            InboundEvent::DirectMessage(_) => DIRECT_MESSAGE,
            InboundEvent::UserOffline { .. } => USER_OFFLINE,
        }
    }
}

/// A client-to-server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "group_message", rename_all = "camelCase")]
    GroupMessage { group_id: GroupId, content: String },
    #[serde(rename = "message", rename_all = "camelCase")]
    DirectMessage { receiver_id: UserId, content: String },
}

impl OutboundFrame {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    mod inbound {
        use super::*;

        #[test]
        fn decodes_group_message() {
            let frame = json!({
                "type": "group_message",
                "data": {
                    "_id": "m1",
                    "content": "hello all",
                    "senderId": "u1",
                    "groupId": "g1",
                    "senderName": "Asha",
                    "timestamp": "2025-03-29T14:03:11+05:30",
                    "isRead": false
                }
            })
            .to_string();

            match InboundEvent::decode(&frame).unwrap() {
                InboundEvent::GroupMessage(msg) => {
                    assert_eq!(msg.group_id, Some(GroupId::from("g1")));
                    assert_eq!(msg.sender_name.as_deref(), Some("Asha"));
                    assert_eq!(msg.content, "hello all");
                }
                other => panic!("Expected GroupMessage, got {:?}", other),
            }
        }

        #[test]
        fn decodes_direct_message() {
            let frame = json!({
                "type": "message",
                "data": {
                    "_id": "m2",
                    "content": "hi",
                    "senderId": "u1",
                    "receiverId": "u2",
                    "timestamp": "2025-03-29T14:03:11+05:30"
                }
            })
            .to_string();

            match InboundEvent::decode(&frame).unwrap() {
                InboundEvent::DirectMessage(msg) => {
                    assert_eq!(msg.receiver_id, Some(UserId::from("u2")));
                    assert!(msg.sender_name.is_none());
                }
                other => panic!("Expected DirectMessage, got {:?}", other),
            }
        }

        #[test]
        fn decodes_user_offline() {
            let frame = r#"{"type": "user_offline", "userId": "u9"}"#;
            assert_eq!(
                InboundEvent::decode(frame).unwrap(),
                InboundEvent::UserOffline {
                    user_id: UserId::from("u9")
                }
            );
        }

        #[test]
        fn rejects_invalid_json() {
            assert!(matches!(
                InboundEvent::decode("{not json"),
                Err(ProtocolError::InvalidJson(_))
            ));
        }

        #[test]
        fn rejects_missing_type() {
            assert_eq!(
                InboundEvent::decode(r#"{"data": {}}"#),
                Err(ProtocolError::MissingType)
            );
        }

        #[test]
        fn rejects_unknown_type() {
            assert_eq!(
                InboundEvent::decode(r#"{"type": "typing", "userId": "u1"}"#),
                Err(ProtocolError::UnknownType("typing".to_string()))
            );
        }

        #[test]
        fn rejects_known_type_with_bad_payload() {
            let err = InboundEvent::decode(r#"{"type": "message", "data": {"_id": "m"}}"#)
                .unwrap_err();
            match err {
                ProtocolError::Malformed { kind, .. } => assert_eq!(kind, "message"),
                other => panic!("Expected Malformed, got {:?}", other),
            }
        }

        #[test]
        fn user_offline_carries_user_id() {
            let event = InboundEvent::decode(r#"{"type": "user_offline", "userId": "u1"}"#).unwrap();
            assert_eq!(
                event,
                InboundEvent::UserOffline {
                    user_id: UserId::from("u1"),
                }
            );
            assert_eq!(event.kind(), "user_offline");
        }
    }

    mod outbound {
        use super::*;

        #[test]
        fn group_frame_shape() {
            let frame = OutboundFrame::GroupMessage {
                group_id: GroupId::from("g1"),
                content: "hello".to_string(),
            };
            let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
            assert_eq!(
                value,
                json!({"type": "group_message", "groupId": "g1", "content": "hello"})
            );
        }

        #[test]
        fn direct_frame_shape() {
            let frame = OutboundFrame::DirectMessage {
                receiver_id: UserId::from("u2"),
                content: "hey".to_string(),
            };
            let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
            assert_eq!(
                value,
                json!({"type": "message", "receiverId": "u2", "content": "hey"})
            );
        }
    }
}
