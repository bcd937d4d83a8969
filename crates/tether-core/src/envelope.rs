//! Envelopes: the complete logical messages exchanged with the orchestrator.
//!
//! On the wire an envelope is a flat JSON object whose `message-type` key is
//! the discriminant; every other key is kind-specific payload. [`Envelope`]
//! keeps that shape (a [`MessageType`] plus a free-form field map) instead of
//! one struct per kind, because the orchestrator forwards envelopes between
//! UI clients and agents and routinely adds keys of its own (`agent_id`,
//! `message_id`, `show_ui`) that must survive a round trip.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::ProtocolError;
use crate::ids::AgentId;
use crate::status::ExecutionState;

/// Wire key carrying the envelope discriminant.
pub const MESSAGE_TYPE_KEY: &str = "message-type";

/// Envelope discriminant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Identity/status announcement (agent → orchestrator on every connect).
    Init,
    /// Start a task (orchestrator → agent).
    Prompt,
    /// Cooperative stop of the running task (orchestrator → agent).
    Stop,
    /// Task output or status (agent → orchestrator).
    Message,
    /// Any discriminant this agent does not understand.
    Other(String),
}

impl MessageType {
    /// Parse a wire discriminant. Unrecognised values become [`MessageType::Other`].
    pub fn from_wire(s: &str) -> Self {
        match s {
            "init" => Self::Init,
            "prompt" => Self::Prompt,
            "stop" => Self::Stop,
            "message" => Self::Message,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Init => "init",
            Self::Prompt => "prompt",
            Self::Stop => "stop",
            Self::Message => "message",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One complete logical message.
///
/// Immutable once built: the builder methods consume `self`.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    kind: MessageType,
    fields: Map<String, Value>,
}

impl Envelope {
    /// Empty envelope of the given kind.
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind,
            fields: Map::new(),
        }
    }

    /// Add (or replace) a payload field. The discriminant key is reserved.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != MESSAGE_TYPE_KEY {
            let _ = self.fields.insert(key, value.into());
        }
        self
    }

    /// Parse a complete envelope from JSON text.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Build an envelope from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let kind = match fields.remove(MESSAGE_TYPE_KEY) {
            Some(Value::String(s)) => MessageType::from_wire(&s),
            _ => return Err(ProtocolError::MissingField("message-type")),
        };
        Ok(Self { kind, fields })
    }

    /// The discriminant.
    pub fn kind(&self) -> &MessageType {
        &self.kind
    }

    /// All payload fields (the discriminant excluded).
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Raw payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// String payload field.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// `true` only when the field is present and the JSON boolean `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.fields.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// The `text` field, if any.
    pub fn text(&self) -> Option<&str> {
        self.str_field("text")
    }

    /// The full wire object, discriminant included.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        let _ = map.insert(
            MESSAGE_TYPE_KEY.to_string(),
            Value::String(self.kind.as_str().to_string()),
        );
        Value::Object(map)
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    // ── Outbound constructors ───────────────────────────────────────────

    /// Identity announcement, sent first on every new connection.
    pub fn init(agent_id: &AgentId, state: ExecutionState) -> Self {
        Self::new(MessageType::Init)
            .with("connection-type", "agent")
            .with("container_id", agent_id.as_str())
            .with("agent_id", agent_id.as_str())
            .with("prompt_running", state.as_str())
            .with("show_ui", false)
    }

    /// Plain text message.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(MessageType::Message).with("text", text.into())
    }

    /// Task failure report.
    pub fn error_message(text: impl Into<String>, state: ExecutionState) -> Self {
        Self::message(text)
            .with("error", true)
            .with("show_ui", true)
            .with("prompt_running", state.as_str())
    }

    /// Terminal message closing one prompt execution.
    pub fn end_message(agent_id: &AgentId, state: ExecutionState) -> Self {
        Self::message(format!("Agent {agent_id} has finished running"))
            .with("end_message", true)
            .with("show_ui", false)
            .with("prompt_running", state.as_str())
    }

    /// Liveness ping.
    pub fn heartbeat() -> Self {
        Self::message("Heartbeat ping").with("show_ui", false)
    }
}

/// One uploaded file as carried in a prompt's `files` array.
///
/// Both fields are optional here so that a malformed entry still reaches
/// the file-ingestion collaborator and is reported per file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploadedFile {
    /// Original file name.
    pub name: Option<String>,
    /// Base64 payload, optionally as a `data:<mime>;base64,` URL.
    pub data: Option<String>,
}

/// Typed view of an inbound `prompt` envelope.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PromptRequest {
    /// Task text.
    pub text: String,
    /// Recent conversation history supplied by the orchestrator.
    pub recent_messages: Vec<Value>,
    /// Attached files, to be written to disk before the task starts.
    pub files: Vec<UploadedFile>,
    /// Extra system prompt configured for this agent.
    pub additional_system_prompt: Option<String>,
}

impl PromptRequest {
    /// Extract the prompt fields. Only `text` is required.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let text = envelope
            .text()
            .ok_or(ProtocolError::MissingField("text"))?
            .to_string();

        let recent_messages = envelope
            .get("recent-messages")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let files = envelope
            .get("files")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| UploadedFile::deserialize(item).unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        let additional_system_prompt = envelope
            .str_field("additional_system_prompt")
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            text,
            recent_messages,
            files,
            additional_system_prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parse_prompt() {
        let env = Envelope::parse(r#"{"message-type":"prompt","text":"hi","agent_id":"a"}"#)
            .unwrap();
        assert_eq!(env.kind(), &MessageType::Prompt);
        assert_eq!(env.text(), Some("hi"));
        assert_eq!(env.str_field("agent_id"), Some("a"));
        assert!(env.get("message-type").is_none());
    }

    #[test]
    fn parse_unknown_kind_is_other() {
        let env = Envelope::parse(r#"{"message-type":"resize"}"#).unwrap();
        assert_eq!(env.kind(), &MessageType::Other("resize".into()));
        assert_eq!(env.kind().as_str(), "resize");
    }

    #[test]
    fn parse_rejects_missing_discriminant() {
        assert_matches!(
            Envelope::parse(r#"{"text":"hi"}"#),
            Err(ProtocolError::MissingField("message-type"))
        );
        assert_matches!(
            Envelope::parse(r#"{"message-type":7}"#),
            Err(ProtocolError::MissingField("message-type"))
        );
    }

    #[test]
    fn parse_rejects_non_object_and_bad_json() {
        assert_matches!(Envelope::parse("[1,2]"), Err(ProtocolError::NotAnObject));
        assert_matches!(Envelope::parse("{nope"), Err(ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn to_value_includes_discriminant() {
        let v = Envelope::message("hello").with("show_ui", true).to_value();
        assert_eq!(v, json!({"message-type": "message", "text": "hello", "show_ui": true}));
    }

    #[test]
    fn with_ignores_reserved_key() {
        let env = Envelope::message("x").with(MESSAGE_TYPE_KEY, "prompt");
        assert_eq!(env.kind(), &MessageType::Message);
        assert_eq!(env.to_value()["message-type"], "message");
    }

    #[test]
    fn json_roundtrip_preserves_unknown_fields() {
        let original = Envelope::parse(
            r#"{"message-type":"message","text":"t","message_id":"x","extra":{"a":1}}"#,
        )
        .unwrap();
        let back = Envelope::parse(&original.to_json()).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn init_envelope_shape() {
        let env = Envelope::init(&AgentId::from("pam-1"), ExecutionState::Stopped);
        assert_eq!(
            env.to_value(),
            json!({
                "message-type": "init",
                "connection-type": "agent",
                "container_id": "pam-1",
                "agent_id": "pam-1",
                "prompt_running": "stopped",
                "show_ui": false,
            })
        );
    }

    #[test]
    fn error_and_end_messages() {
        let err = Envelope::error_message("boom", ExecutionState::Running);
        assert!(err.flag("error"));
        assert!(!err.flag("end_message"));
        assert_eq!(err.text(), Some("boom"));

        let end = Envelope::end_message(&AgentId::from("a1"), ExecutionState::Stopped);
        assert!(end.flag("end_message"));
        assert!(!end.flag("error"));
        assert_eq!(end.text(), Some("Agent a1 has finished running"));
        assert_eq!(end.str_field("prompt_running"), Some("stopped"));
    }

    #[test]
    fn flag_requires_true_boolean() {
        let env = Envelope::message("x").with("error", "true");
        assert!(!env.flag("error"));
        assert!(!env.flag("absent"));
    }

    #[test]
    fn prompt_request_full() {
        let env = Envelope::from_value(json!({
            "message-type": "prompt",
            "text": "summarise",
            "recent-messages": [{"text": "earlier"}],
            "files": [{"name": "a.pdf", "data": "QUJD"}, "garbage"],
            "additional_system_prompt": "be brief",
        }))
        .unwrap();
        let req = PromptRequest::from_envelope(&env).unwrap();
        assert_eq!(req.text, "summarise");
        assert_eq!(req.recent_messages.len(), 1);
        assert_eq!(req.files.len(), 2);
        assert_eq!(req.files[0].name.as_deref(), Some("a.pdf"));
        assert_eq!(req.files[1], UploadedFile::default());
        assert_eq!(req.additional_system_prompt.as_deref(), Some("be brief"));
    }

    #[test]
    fn prompt_request_minimal() {
        let env = Envelope::new(MessageType::Prompt).with("text", "go");
        let req = PromptRequest::from_envelope(&env).unwrap();
        assert!(req.recent_messages.is_empty());
        assert!(req.files.is_empty());
        assert!(req.additional_system_prompt.is_none());
    }

    #[test]
    fn prompt_request_empty_system_prompt_is_none() {
        let env = Envelope::new(MessageType::Prompt)
            .with("text", "go")
            .with("additional_system_prompt", "");
        let req = PromptRequest::from_envelope(&env).unwrap();
        assert!(req.additional_system_prompt.is_none());
    }

    #[test]
    fn prompt_request_requires_text() {
        let env = Envelope::new(MessageType::Prompt);
        assert_matches!(
            PromptRequest::from_envelope(&env),
            Err(ProtocolError::MissingField("text"))
        );
    }
}
