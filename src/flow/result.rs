use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome of one flow attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    Success,
    Fail { message: Option<String> },
    /// The user closed the popup before it reported anything.
    Cancel,
}

impl FlowStatus {
    pub fn fail(message: impl Into<String>) -> Self {
        FlowStatus::Fail {
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowStatus::Success => write!(f, "success"),
            FlowStatus::Fail { message: Some(m) } => write!(f, "fail ({})", m),
            FlowStatus::Fail { message: None } => write!(f, "fail"),
            FlowStatus::Cancel => write!(f, "cancel"),
        }
    }
}

/// Published result of a flow, as seen by subscribers.
///
/// `Fail` and `Cancel` both collapse to `succeeded: false`; only `Fail`
/// carries a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowResult {
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FlowResult {
    /// Result handed to a caller that re-triggered while a flow was in flight.
    pub fn rejected() -> Self {
        Self {
            succeeded: false,
            message: Some(String::new()),
        }
    }
}

impl From<FlowStatus> for FlowResult {
    fn from(status: FlowStatus) -> Self {
        match status {
            FlowStatus::Success => Self {
                succeeded: true,
                message: None,
            },
            FlowStatus::Fail { message } => Self {
                succeeded: false,
                message,
            },
            FlowStatus::Cancel => Self {
                succeeded: false,
                message: None,
            },
        }
    }
}
