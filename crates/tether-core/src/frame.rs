//! Inbound frames.
//!
//! Every text frame from the orchestrator is either a complete envelope or
//! one fragment of a larger envelope the orchestrator split before sending.
//! A JSON object carrying `chunk` or `total_chunks` is a fragment; anything
//! else is an envelope.

use serde_json::{Map, Value};

use crate::envelope::Envelope;
use crate::errors::ProtocolError;
use crate::ids::MessageId;

/// One piece of a larger envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Fragment group.
    pub message_id: MessageId,
    /// Zero-based position within the group.
    pub chunk: u32,
    /// Number of fragments in the group (at least 1).
    pub total_chunks: u32,
    /// This fragment's slice of the serialized envelope.
    pub data: String,
}

impl Fragment {
    /// Build a fragment, checking that `chunk` lies in `[0, total_chunks)`.
    pub fn new(
        message_id: impl Into<MessageId>,
        chunk: u32,
        total_chunks: u32,
        data: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let message_id = message_id.into();
        if total_chunks == 0 {
            return Err(ProtocolError::InvalidFragment {
                message_id: message_id.into_inner(),
                reason: "total_chunks must be at least 1".into(),
            });
        }
        if chunk >= total_chunks {
            return Err(ProtocolError::InvalidFragment {
                message_id: message_id.into_inner(),
                reason: format!("chunk {chunk} out of range for {total_chunks} chunks"),
            });
        }
        Ok(Self {
            message_id,
            chunk,
            total_chunks,
            data: data.into(),
        })
    }

    /// Read a fragment out of a decoded JSON object.
    ///
    /// `message_id` may be a string or a number; the orchestrator has sent
    /// both over time.
    pub fn from_object(obj: &Map<String, Value>) -> Result<Self, ProtocolError> {
        let message_id = match obj.get("message_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ProtocolError::MissingField("message_id")),
        };
        let chunk = index_field(obj, "chunk")?;
        let total_chunks = index_field(obj, "total_chunks")?;
        let data = obj
            .get("data")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingField("data"))?;
        Self::new(message_id, chunk, total_chunks, data)
    }
}

fn index_field(obj: &Map<String, Value>, key: &'static str) -> Result<u32, ProtocolError> {
    obj.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(ProtocolError::MissingField(key))
}

/// A decoded inbound text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundFrame {
    /// Part of a larger envelope; feed to the reassembler.
    Fragment(Fragment),
    /// A complete envelope sent unfragmented.
    Envelope(Envelope),
}

impl InboundFrame {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let Value::Object(obj) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        if obj.contains_key("chunk") || obj.contains_key("total_chunks") {
            Fragment::from_object(&obj).map(Self::Fragment)
        } else {
            Envelope::from_value(Value::Object(obj)).map(Self::Envelope)
        }
    }
}
