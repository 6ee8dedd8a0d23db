//! Streaming frame wire format: a tagged JSON enum,
//! `{type, queue_id?, access_token?, message_id?, payload?, error?,
//! timestamp?}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        queue_id: String,
        access_token: Option<String>,
    },
    Unsubscribe {
        queue_id: String,
    },
    Ack {
        queue_id: String,
        message_id: String,
        access_token: String,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Message {
        queue_id: String,
        message_id: String,
        #[serde(with = "crate::endpoints::payload")]
        payload: Vec<u8>,
        timestamp: DateTime<Utc>,
    },
    Pong,
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_frame_parses() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","queue_id":"abc"}"#).unwrap();
        matches!(frame, ClientFrame::Subscribe { queue_id, .. } if queue_id == "abc");
    }

    #[test]
    fn ack_frame_parses() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"ack","queue_id":"abc","message_id":"m1","access_token":"t"}"#,
        )
        .unwrap();
        match frame {
            ClientFrame::Ack {
                queue_id,
                message_id,
                access_token,
            } => {
                assert_eq!(queue_id, "abc");
                assert_eq!(message_id, "m1");
                assert_eq!(access_token, "t");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn message_frame_serializes_with_type_tag() {
        let frame = ServerFrame::Message {
            queue_id: "abc".into(),
            message_id: "m1".into(),
            payload: vec![9, 9],
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"payload\":[9,9]"));
    }
}
