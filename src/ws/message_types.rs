use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Exercise clock tick. Supersedes any previous tick.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct TimerMessage {
    pub formatted: String,
    pub elapsed: f64,
}

/// Lifecycle directive carried on the control topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Pause,
    Resume,
    Stop,
    /// Anything else. Carried through so it can be logged, then ignored.
    Unknown(String),
}

impl From<&str> for ControlCommand {
    fn from(value: &str) -> Self {
        match value {
            "pause" => ControlCommand::Pause,
            "resume" => ControlCommand::Resume,
            "stop" => ControlCommand::Stop,
            other => ControlCommand::Unknown(other.to_string()),
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlCommand::Pause => write!(f, "pause"),
            ControlCommand::Resume => write!(f, "resume"),
            ControlCommand::Stop => write!(f, "stop"),
            ControlCommand::Unknown(other) => write!(f, "{other}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlMessage {
    pub command: ControlCommand,
}

/// Turn-based exercise side channel. Superseded on each arrival.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    pub turn_based: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_turn: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_turns: Option<u32>,
}

/// Envelope pushed by the bus for every publication on a subscribed topic.
///
/// `payload` is normally the publisher's raw text. Some brokers inline JSON
/// payloads instead; those are re-serialised so the engine always sees text.
#[derive(Deserialize, Clone, Debug)]
pub(crate) struct WsFrame {
    pub(crate) topic: String,
    pub(crate) payload: FramePayload,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub(crate) enum FramePayload {
    Text(String),
    Json(Value),
}

impl FramePayload {
    pub(crate) fn into_text(self) -> String {
        match self {
            FramePayload::Text(text) => text,
            FramePayload::Json(value) => value.to_string(),
        }
    }
}

/// Client-to-bus request.
#[derive(Serialize, Debug)]
#[serde(tag = "method", rename_all = "camelCase")]
pub(crate) enum WsRequest<'a> {
    Subscribe { topic: &'a str },
    Publish { topic: &'a str, payload: &'a str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_request_shape() {
        let encoded = serde_json::to_value(WsRequest::Subscribe {
            topic: "exercise/e1/timer",
        })
        .unwrap();
        assert_eq!(
            encoded,
            json!({"method": "subscribe", "topic": "exercise/e1/timer"})
        );
    }

    #[test]
    fn test_publish_request_shape() {
        let encoded = serde_json::to_value(WsRequest::Publish {
            topic: "t",
            payload: "{\"id\":\"x\"}",
        })
        .unwrap();
        assert_eq!(encoded["method"], "publish");
        assert_eq!(encoded["payload"], "{\"id\":\"x\"}");
    }

    #[test]
    fn test_frame_payload_variants() {
        let text: WsFrame =
            serde_json::from_str(r#"{"topic":"a","payload":"not json at all"}"#).unwrap();
        assert_eq!(text.payload.into_text(), "not json at all");

        let inline: WsFrame =
            serde_json::from_str(r#"{"topic":"a","payload":{"command":"pause"}}"#).unwrap();
        assert_eq!(inline.payload.into_text(), r#"{"command":"pause"}"#);
    }

    #[test]
    fn test_control_command_from_str() {
        assert_eq!(ControlCommand::from("pause"), ControlCommand::Pause);
        assert_eq!(
            ControlCommand::from("rewind"),
            ControlCommand::Unknown("rewind".to_string())
        );
    }

    #[test]
    fn test_status_message_camel_case() {
        let status: StatusMessage =
            serde_json::from_value(json!({"turnBased": true, "currentTurn": 2, "totalTurns": 5}))
                .unwrap();
        assert!(status.turn_based);
        assert_eq!(status.current_turn, Some(2));
        assert_eq!(status.total_turns, Some(5));
    }
}
