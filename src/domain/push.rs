use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message as submitted to the push gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub to: String,
    pub sound: String,
    pub body: String,
    pub data: Value,
    pub category_id: String,
}

/// Error payload attached to a rejected ticket or a failed receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub error: String,
}

impl ErrorDetails {
    pub fn new(code: impl Into<String>) -> Self {
        Self { error: code.into() }
    }

    pub fn kind(&self) -> GatewayErrorKind {
        GatewayErrorKind::parse(&self.error)
    }
}

/// Gateway error codes the classifier knows about, plus a bucket for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    DeviceNotRegistered,
    MessageRateExceeded,
    MessageTooBig,
    InvalidCredentials,
    Unknown,
}

impl GatewayErrorKind {
    pub fn parse(code: &str) -> Self {
        match code {
            "DeviceNotRegistered" => Self::DeviceNotRegistered,
            "MessageRateExceeded" => Self::MessageRateExceeded,
            "MessageTooBig" => Self::MessageTooBig,
            "InvalidCredentials" => Self::InvalidCredentials,
            _ => Self::Unknown,
        }
    }
}

/// The gateway's immediate acknowledgment for one submitted message. Tickets
/// come back in the same order as the messages within a chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ticket {
    Ok {
        id: String,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        details: ErrorDetails,
    },
}

/// The gateway's later report of the actual delivery outcome for an accepted
/// ticket, fetched by ticket id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Receipt {
    Ok,
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        details: ErrorDetails,
    },
}
