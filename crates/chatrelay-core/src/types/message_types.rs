//! Transcript message and tool call types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// Name/value pair attached to a tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A tool invocation reported by the agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub parameters: Vec<Parameter>,
}

impl ToolCall {
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Message in a session transcript
///
/// Only the most recent agent message may be open; an open message is the
/// one that still receives content replacements and tool calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub open: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: format!("user-{}", uuid::Uuid::new_v4()),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            open: false,
        }
    }

    /// New open agent message
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            id: format!("ai-{}", uuid::Uuid::new_v4()),
            role: Role::Agent,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            open: true,
        }
    }

    pub fn is_open_agent(&self) -> bool {
        self.role == Role::Agent && self.open
    }
}
