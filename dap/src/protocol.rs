//! # DAP message envelopes
//!
//! spec §6: three message kinds (`request`, `response`, `event`) sharing a
//! `seq` counter. Request-specific fields are decoded loosely as
//! `serde_json::Value` since `arguments`/`body` shapes vary per command —
//! this session only ever inspects the handful of fields each command uses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub request_seq: u64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    pub fn ok(seq: u64, request_seq: u64, command: &str, body: Option<Value>) -> Self {
        Self { seq, kind: "response", request_seq, success: true, command: command.into(), message: None, body }
    }

    pub fn err(seq: u64, request_seq: u64, command: &str, message: impl Into<String>) -> Self {
        Self {
            seq,
            kind: "response",
            request_seq,
            success: false,
            command: command.into(),
            message: Some(message.into()),
            body: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Event {
    pub fn new(seq: u64, event: &str, body: Option<Value>) -> Self {
        Self { seq, kind: "event", event: event.into(), body }
    }
}
