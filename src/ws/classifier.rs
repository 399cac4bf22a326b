//! Structural message classification.
//!
//! Several logical channels share one delivery path in some deployments (a
//! team feed topic may carry timer ticks, control directives and injects), so
//! the topic a payload arrived on says nothing reliable about what it is.
//! The payload's shape decides, in a fixed order:
//!
//! | Shape | Kind |
//! |-------|------|
//! | `formatted` + `elapsed` | [`Message::Timer`] |
//! | `command`, no `id` | [`Message::Control`] |
//! | `turnBased` | [`Message::Status`] |
//! | `id` | [`Message::Inject`] |
//!
//! Anything else classifies to `None` and is dropped without logging.

use serde_json::{Map, Value};

use crate::{
    types::Inject,
    ws::message_types::{ControlCommand, ControlMessage, StatusMessage, TimerMessage},
};

/// A classified inbound bus message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Timer(TimerMessage),
    Control(ControlMessage),
    Status(StatusMessage),
    Inject(Box<Inject>),
}

impl Message {
    /// Short kind label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Timer(_) => "timer",
            Message::Control(_) => "control",
            Message::Status(_) => "status",
            Message::Inject(_) => "inject",
        }
    }
}

/// Classify a decoded payload by its shape.
pub fn classify(payload: &Value) -> Option<Message> {
    let object = payload.as_object()?;

    if object.contains_key("formatted") && object.contains_key("elapsed") {
        return timer(object).map(Message::Timer);
    }
    if object.contains_key("command") && !object.contains_key("id") {
        return control(object).map(Message::Control);
    }
    if object.contains_key("turnBased") {
        return serde_json::from_value::<StatusMessage>(payload.clone())
            .ok()
            .map(Message::Status);
    }
    if object.contains_key("id") {
        return serde_json::from_value::<Inject>(payload.clone())
            .ok()
            .map(|inject| Message::Inject(Box::new(inject)));
    }
    None
}

fn timer(object: &Map<String, Value>) -> Option<TimerMessage> {
    let formatted = match object.get("formatted")? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let elapsed = object.get("elapsed")?.as_f64()?;
    Some(TimerMessage { formatted, elapsed })
}

fn control(object: &Map<String, Value>) -> Option<ControlMessage> {
    let command = object.get("command")?.as_str()?;
    Some(ControlMessage {
        command: ControlCommand::from(command),
    })
}
