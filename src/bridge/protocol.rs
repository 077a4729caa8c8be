use crate::flow::FlowStatus;
use serde::Deserialize;
use serde_json::Value;

/// A message posted to the opener window, as delivered by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    /// Origin of the sending window (`scheme://host[:port]`).
    pub origin: String,
    pub data: Value,
}

impl WindowMessage {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Popup → opener: flow completion payload.
///
/// `status` stays untyped here so unknown tokens can be told apart from
/// messages that don't belong to the flow protocol at all.
#[derive(Debug, Clone, Deserialize)]
struct FlowMessage {
    #[serde(rename = "type")]
    msg_type: String,
    #[serde(default)]
    status: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

/// Outcome tokens understood in the `status` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StatusToken {
    Success,
    Fail,
    Cancel,
}

/// Result of decoding one posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Not a flow message; ignore without touching any flow.
    Ignored,
    /// A flow message with a recognized status.
    Status(FlowStatus),
    /// A flow message whose status could not be understood.
    Malformed { status: Option<String>, fallback: FlowStatus },
}

/// Decode `data` as a flow message carrying the `message_type` discriminator.
pub fn decode(data: &Value, message_type: &str) -> Decoded {
    let Ok(msg) = FlowMessage::deserialize(data) else {
        return Decoded::Ignored;
    };
    if msg.msg_type != message_type {
        return Decoded::Ignored;
    }

    let detail = match msg.message {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };

    let token = msg
        .status
        .as_ref()
        .and_then(|s| StatusToken::deserialize(s).ok());

    match token {
        Some(StatusToken::Success) => Decoded::Status(FlowStatus::Success),
        Some(StatusToken::Fail) => Decoded::Status(FlowStatus::Fail { message: detail }),
        Some(StatusToken::Cancel) => Decoded::Status(FlowStatus::Cancel),
        None => Decoded::Malformed {
            status: msg.status.map(|s| s.to_string()),
            fallback: FlowStatus::Fail { message: detail },
        },
    }
}
