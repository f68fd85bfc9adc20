//! Message validation and annotation
//!
//! Inbound payloads are JSON objects carrying a `message_id`; everything else
//! in the object is opaque and passed through untouched.

use dedup_store::MessageId;
use serde_json::{Map, Value};
use thiserror::Error;

pub const MESSAGE_ID_FIELD: &str = "message_id";
pub const CONSUMER_ID_FIELD: &str = "consumer_id";

/// Per-message failures; the message is dropped and the loop continues.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Error parsing JSON: {0}")]
    MalformedJson(#[source] serde_json::Error),

    #[error("'message_id' is missing or not a string")]
    MissingIdentifier,

    #[error("Error serializing JSON object for message {message_id}: {source}")]
    Serialization {
        message_id: MessageId,
        #[source]
        source: serde_json::Error,
    },
}

/// A validated inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Identifier, truncated to the canonical length
    pub id: MessageId,
    /// The original JSON object, including `message_id`
    pub fields: Map<String, Value>,
}

impl Message {
    /// Parse and validate a raw channel payload.
    ///
    /// Fails with `MalformedJson` when the payload is not JSON and with
    /// `MissingIdentifier` when it is not an object with a string `message_id`.
    pub fn parse(raw: &[u8]) -> Result<Self, ProcessError> {
        let value: Value = serde_json::from_slice(raw).map_err(ProcessError::MalformedJson)?;

        let Value::Object(fields) = value else {
            return Err(ProcessError::MissingIdentifier);
        };

        let id = fields
            .get(MESSAGE_ID_FIELD)
            .and_then(Value::as_str)
            .map(MessageId::new)
            .ok_or(ProcessError::MissingIdentifier)?;

        Ok(Self { id, fields })
    }

    /// Stamp the message with its identifier and the consumer that handled it.
    ///
    /// Overwrites `message_id` (with the truncated form) and `consumer_id`,
    /// leaves every other field as received, and returns compact JSON.
    pub fn annotate(&self, consumer_id: u32) -> Result<String, ProcessError> {
        let mut fields = self.fields.clone();
        fields.insert(
            MESSAGE_ID_FIELD.to_string(),
            Value::String(self.id.as_str().to_string()),
        );
        fields.insert(CONSUMER_ID_FIELD.to_string(), Value::from(consumer_id));

        serde_json::to_string(&fields).map_err(|source| ProcessError::Serialization {
            message_id: self.id.clone(),
            source,
        })
    }
}
