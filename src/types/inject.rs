use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::consts::TRIGGER_INJECT_TYPE;

/// Open enumeration of inject types.
///
/// Unknown values are preserved verbatim in `Other` so that new scenario
/// content types render (as something) without a crate upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InjectType {
    #[default]
    News,
    Social,
    Email,
    Sms,
    Intel,
    System,
    Trigger,
    Other(String),
}

impl InjectType {
    pub fn as_str(&self) -> &str {
        match self {
            InjectType::News => "news",
            InjectType::Social => "social",
            InjectType::Email => "email",
            InjectType::Sms => "sms",
            InjectType::Intel => "intel",
            InjectType::System => "system",
            InjectType::Trigger => TRIGGER_INJECT_TYPE,
            InjectType::Other(other) => other,
        }
    }
}

impl From<String> for InjectType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "news" => InjectType::News,
            "social" => InjectType::Social,
            "email" => InjectType::Email,
            "sms" => InjectType::Sms,
            "intel" => InjectType::Intel,
            "system" => InjectType::System,
            TRIGGER_INJECT_TYPE => InjectType::Trigger,
            _ => InjectType::Other(value),
        }
    }
}

impl From<InjectType> for String {
    fn from(value: InjectType) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for InjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inject body: free-form text or a type-dependent structured object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InjectContent {
    Text(String),
    Structured(Value),
}

/// Presentation-side action attached to an inject. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A discrete, timed content event delivered to a team.
///
/// Injects are append-only: once accepted by an [`InjectStore`] they are
/// never edited.
///
/// [`InjectStore`]: crate::exercise::InjectStore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inject {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Seconds from exercise start at which the inject was scheduled.
    #[serde(rename = "time", default, deserialize_with = "null_as_default")]
    pub scheduled_time: f64,
    /// Seconds from exercise start at which the bus actually delivered it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<f64>,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub inject_type: InjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<InjectContent>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub media: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<InjectAction>,
}

impl Inject {
    /// Parse the command payload of a trigger inject.
    ///
    /// Returns `None` for non-trigger injects and for trigger injects whose
    /// content lacks a string `command`.
    pub fn command(&self) -> Option<CommandInject<'_>> {
        if self.inject_type != InjectType::Trigger {
            return None;
        }
        let Some(InjectContent::Structured(Value::Object(content))) = &self.content else {
            return None;
        };
        let name = content.get("command")?.as_str()?;
        let parameters = content.get("parameters").and_then(Value::as_object);
        Some(CommandInject {
            name,
            parameters,
            time: self.delivered_at.unwrap_or(self.scheduled_time),
        })
    }

    pub fn is_trigger(&self) -> bool {
        self.inject_type == InjectType::Trigger
    }
}

/// Borrowed view of a trigger inject's command directive.
#[derive(Debug, Clone, Copy)]
pub struct CommandInject<'a> {
    pub name: &'a str,
    pub parameters: Option<&'a Map<String, Value>>,
    /// Exercise time the command takes effect at, in seconds.
    pub time: f64,
}

/// Accept string ids, and numeric ids as their decimal text.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "inject id must be a string or number, got {other}"
        ))),
    }
}

/// Treat an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
