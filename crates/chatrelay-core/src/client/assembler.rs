//! Message and tool call assembler
//!
//! Folds inbound wire events into the session transcript. Events are applied
//! one at a time in arrival order; the assembler is the only code that
//! mutates messages once they are in the transcript.

use crate::types::{Message, Notification, Parameter, Role, ToolCall, WireEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Name given to tool payloads that are not a JSON object
pub const FALLBACK_TOOL_NAME: &str = "tool-response";

/// Ordered list of messages for one session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The open agent message, if any (always the last message)
    pub fn open_message(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.is_open_agent())
    }

    /// Append a closed user message, closing the open agent message first
    pub(crate) fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.close_open();
        self.messages.push(Message::user(content));
        &self.messages[self.messages.len() - 1]
    }

    /// Remove the trailing user message, if the last message is one
    pub(crate) fn pop_user(&mut self) -> Option<Message> {
        match self.messages.last() {
            Some(last) if last.role == Role::User => self.messages.pop(),
            _ => None,
        }
    }

    pub(crate) fn close_open(&mut self) {
        if let Some(last) = self.messages.last_mut() {
            last.open = false;
        }
    }

    fn open_message_mut(&mut self) -> Option<(usize, &mut Message)> {
        let index = self.messages.len().checked_sub(1)?;
        let last = &mut self.messages[index];
        if last.is_open_agent() {
            Some((index, last))
        } else {
            None
        }
    }

    fn push_agent(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }
}

/// What applying an event did to the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    /// Open message at `index` had its content replaced
    ContentReplaced { index: usize },
    /// New open agent message appended at `index`
    MessageOpened { index: usize },
    /// Tool call appended to the message at `index`; `opened` when that
    /// message was created for it
    ToolCallAppended { index: usize, opened: bool },
    /// Transcript untouched; surface to the user
    Notify(Notification),
    /// Event carried nothing to apply
    Ignored,
}

/// Apply one inbound event to the transcript
pub fn apply(transcript: &mut Transcript, event: WireEvent) -> Reduction {
    match event {
        WireEvent::Message { content, .. } => match content.filter(|c| !c.is_empty()) {
            Some(text) => replace_or_open(transcript, text),
            None => Reduction::Ignored,
        },
        WireEvent::Tools { content, .. } => match content.filter(|c| !c.is_empty()) {
            Some(raw) => append_tool_call(transcript, parse_tool_call(&raw)),
            None => Reduction::Ignored,
        },
        WireEvent::Error { content, .. } => Reduction::Notify(Notification::Error(
            content.unwrap_or_else(|| "Unknown error".to_string()),
        )),
        WireEvent::Connection { content, .. } => match content {
            Some(status) => Reduction::Notify(Notification::Status(status)),
            None => Reduction::Ignored,
        },
    }
}

/// By-value form of [`apply`]
pub fn reduce(mut transcript: Transcript, event: WireEvent) -> (Transcript, Reduction) {
    let reduction = apply(&mut transcript, event);
    (transcript, reduction)
}

fn replace_or_open(transcript: &mut Transcript, text: String) -> Reduction {
    if let Some((index, open)) = transcript.open_message_mut() {
        open.content = text;
        return Reduction::ContentReplaced { index };
    }
    let index = transcript.push_agent(Message::agent(text));
    Reduction::MessageOpened { index }
}

fn append_tool_call(transcript: &mut Transcript, tool_call: ToolCall) -> Reduction {
    if let Some((index, open)) = transcript.open_message_mut() {
        open.tool_calls.push(tool_call);
        return Reduction::ToolCallAppended {
            index,
            opened: false,
        };
    }
    let mut message = Message::agent(String::new());
    message.tool_calls.push(tool_call);
    let index = transcript.push_agent(message);
    Reduction::ToolCallAppended {
        index,
        opened: true,
    }
}

/// Parse a raw tool payload.
///
/// JSON objects may carry `id`, `name` and `parameters` (an object of
/// name → value or a list of `{name, value}`). Anything else becomes a
/// `tool-response` call with the raw text in a `message` parameter.
pub fn parse_tool_call(raw: &str) -> ToolCall {
    let object = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            debug!("Received plain text tool response: {}", raw);
            return ToolCall {
                id: new_tool_call_id(),
                name: FALLBACK_TOOL_NAME.to_string(),
                parameters: vec![Parameter::new("message", raw)],
            };
        }
    };

    let id = match object.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => new_tool_call_id(),
    };

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(FALLBACK_TOOL_NAME)
        .to_string();

    let parameters = match object.get("parameters") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, value)| Parameter::new(name.clone(), canonical_string(value)))
            .collect(),
        Some(Value::Array(entries)) => entries.iter().filter_map(parameter_entry).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            debug!("Ignoring tool parameters of unexpected shape: {}", other);
            Vec::new()
        }
    };

    ToolCall {
        id,
        name,
        parameters,
    }
}

fn parameter_entry(entry: &Value) -> Option<Parameter> {
    let name = match entry.get("name")? {
        Value::String(s) => s.clone(),
        other => canonical_string(other),
    };
    let value = entry.get("value").map(canonical_string).unwrap_or_default();
    Some(Parameter::new(name, value))
}

/// Strings pass through; everything else becomes compact JSON text
fn canonical_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn new_tool_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use pretty_assertions::assert_eq;

    fn message(text: &str) -> WireEvent {
        WireEvent::message(text)
    }

    #[test]
    fn test_message_events_replace_not_concatenate() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");

        assert_eq!(
            apply(&mut transcript, message("H")),
            Reduction::MessageOpened { index: 1 }
        );
        assert_eq!(
            apply(&mut transcript, message("He")),
            Reduction::ContentReplaced { index: 1 }
        );
        apply(&mut transcript, message("Hello"));

        assert_eq!(transcript.len(), 2);
        let last = transcript.last().unwrap();
        assert_eq!(last.role, Role::Agent);
        assert_eq!(last.content, "Hello");
        assert!(last.open);
        assert_eq!(transcript.messages()[0].role, Role::User);
        assert_eq!(transcript.messages()[0].content, "hi");
    }

    #[test]
    fn test_user_message_closes_open_agent_message() {
        let mut transcript = Transcript::new();
        apply(&mut transcript, message("first answer"));
        transcript.push_user("next question");

        let reduction = apply(&mut transcript, WireEvent::tools(r#"{"name":"swap"}"#));
        assert_eq!(
            reduction,
            Reduction::ToolCallAppended {
                index: 2,
                opened: true
            }
        );

        let earlier = &transcript.messages()[0];
        assert!(!earlier.open);
        assert!(earlier.tool_calls.is_empty());
        assert_eq!(earlier.content, "first answer");

        let opened = transcript.last().unwrap();
        assert_eq!(opened.content, "");
        assert_eq!(opened.tool_calls[0].name, "swap");
    }

    #[test]
    fn test_tool_call_with_parameter_object() {
        let call = parse_tool_call(r#"{"name":"swap","parameters":{"amount":"5"}}"#);
        assert_eq!(call.name, "swap");
        assert_eq!(call.parameters, vec![Parameter::new("amount", "5")]);
        assert!(!call.id.is_empty());
    }

    #[test]
    fn test_plain_text_tool_payload() {
        let call = parse_tool_call("done");
        assert_eq!(call.name, FALLBACK_TOOL_NAME);
        assert_eq!(call.parameters, vec![Parameter::new("message", "done")]);
    }

    #[test]
    fn test_non_object_json_is_treated_as_text() {
        let call = parse_tool_call("42");
        assert_eq!(call.name, FALLBACK_TOOL_NAME);
        assert_eq!(call.parameter("message"), Some("42"));
    }

    #[test]
    fn test_non_string_values_are_canonicalized() {
        let call = parse_tool_call(
            r#"{"id":"call-1","name":"stake","parameters":{"amount":5,"opts":{"fast":true},"memo":null}}"#,
        );
        assert_eq!(call.id, "call-1");
        assert_eq!(
            call.parameters,
            vec![
                Parameter::new("amount", "5"),
                Parameter::new("opts", r#"{"fast":true}"#),
                Parameter::new("memo", "null"),
            ]
        );
    }

    #[test]
    fn test_parameter_list_form() {
        let call = parse_tool_call(
            r#"{"name":"swap","parameters":[{"name":"from","value":"PHRS"},{"name":"amount","value":1.5},{"value":"orphan"}]}"#,
        );
        assert_eq!(
            call.parameters,
            vec![Parameter::new("from", "PHRS"), Parameter::new("amount", "1.5")]
        );
    }

    #[test]
    fn test_missing_name_and_id_are_filled_in() {
        let a = parse_tool_call(r#"{"parameters":{"x":"1"}}"#);
        let b = parse_tool_call(r#"{"parameters":{"x":"1"}}"#);
        assert_eq!(a.name, FALLBACK_TOOL_NAME);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_tool_calls_and_content_follow_arrival_order() {
        let mut transcript = Transcript::new();
        transcript.push_user("swap please");
        apply(&mut transcript, message("Swapping"));
        apply(&mut transcript, WireEvent::tools(r#"{"id":"a","name":"quote"}"#));
        apply(&mut transcript, message("Swapping now"));
        apply(&mut transcript, WireEvent::tools(r#"{"id":"b","name":"swap"}"#));

        assert_eq!(transcript.len(), 2);
        let agent = transcript.last().unwrap();
        assert_eq!(agent.content, "Swapping now");
        let ids: Vec<_> = agent.tool_calls.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_error_and_connection_events_leave_transcript_alone() {
        let mut transcript = Transcript::new();
        apply(&mut transcript, message("partial"));
        let before = transcript.clone();

        assert_eq!(
            apply(&mut transcript, WireEvent::error("boom")),
            Reduction::Notify(Notification::Error("boom".to_string()))
        );
        assert_eq!(
            apply(
                &mut transcript,
                WireEvent::Error {
                    content: None,
                    timestamp: None
                }
            ),
            Reduction::Notify(Notification::Error("Unknown error".to_string()))
        );
        assert_eq!(
            apply(&mut transcript, WireEvent::connection("ready")),
            Reduction::Notify(Notification::Status("ready".to_string()))
        );
        assert_eq!(transcript, before);
    }

    #[test]
    fn test_empty_payloads_are_ignored() {
        let mut transcript = Transcript::new();
        assert_eq!(apply(&mut transcript, message("")), Reduction::Ignored);
        assert_eq!(
            apply(
                &mut transcript,
                WireEvent::Tools {
                    content: None,
                    timestamp: None
                }
            ),
            Reduction::Ignored
        );
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_reduce_by_value() {
        let (transcript, reduction) = reduce(Transcript::new(), message("Hi"));
        assert_eq!(reduction, Reduction::MessageOpened { index: 0 });
        assert_eq!(transcript.open_message().unwrap().content, "Hi");
    }
}
