//! JSON payload codec.
//!
//! Payloads travel to and from the store as text. Encoding happens once on
//! the write path; decoding turns engine rows into [`Message`]s. Absent
//! metadata stays absent in both directions, it is never replaced with an
//! empty object.

use chrono::NaiveDateTime;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{MessageDbError, Result};
use crate::store::MessageRow;

/// A message read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub stream_name: String,
    pub message_type: String,
    /// Position within the stream, starting at 0.
    pub position: i64,
    /// Position within the store's global log, starting at 1.
    pub global_position: i64,
    pub data: Value,
    pub metadata: Option<Value>,
    /// Store-assigned UTC write time.
    pub time: NaiveDateTime,
}

impl TryFrom<MessageRow> for Message {
    type Error = MessageDbError;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            stream_name: row.stream_name,
            message_type: row.message_type,
            position: row.position,
            global_position: row.global_position,
            data: serde_json::from_str(&row.data)?,
            metadata: row
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            time: row.time,
        })
    }
}

/// Encodes a payload to its wire text.
pub(crate) fn encode(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Encodes an optional payload; `None` stays `None` (SQL NULL).
pub(crate) fn encode_optional(value: Option<&Value>) -> Result<Option<String>> {
    value.map(encode).transpose()
}

/// Decodes a batch of engine rows.
pub(crate) fn decode_rows(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}
