//! Wire envelope for queued commands and integration events.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::PublishError;

/// Metadata key naming the payload encoding.
pub const CONTENT_TYPE: &str = "content-type";

/// Payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Compact binary via `bitcode`.
    #[default]
    Bitcode,
    Json,
}

impl Encoding {
    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Bitcode => "application/x-bitcode",
            Encoding::Json => "application/json",
        }
    }

    fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/x-bitcode" => Some(Encoding::Bitcode),
            "application/json" => Some(Encoding::Json),
            _ => None,
        }
    }
}

/// A message on its way through a transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique identifier, used for ack/nack and deduplication
    pub id: String,
    /// Routing name of the carried message (`Message::message_name`)
    pub message_type: String,
    /// Encoded payload
    pub payload: Vec<u8>,
    /// Optional headers (content type, correlation ids, timestamps)
    pub metadata: Option<Vec<(String, String)>>,
}

impl Envelope {
    pub fn new(id: impl Into<String>, message_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            message_type: message_type.into(),
            payload,
            metadata: None,
        }
    }

    /// Encode `payload` with bitcode.
    pub fn encode<T: Serialize>(
        id: impl Into<String>,
        message_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, PublishError> {
        Self::encode_with(id, message_type, payload, Encoding::Bitcode)
    }

    /// Encode `payload` as JSON.
    pub fn encode_json<T: Serialize>(
        id: impl Into<String>,
        message_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, PublishError> {
        Self::encode_with(id, message_type, payload, Encoding::Json)
    }

    pub fn encode_with<T: Serialize>(
        id: impl Into<String>,
        message_type: impl Into<String>,
        payload: &T,
        encoding: Encoding,
    ) -> Result<Self, PublishError> {
        let bytes = match encoding {
            Encoding::Bitcode => bitcode::serialize(payload)
                .map_err(|e| PublishError::SerializationFailed(e.to_string()))?,
            Encoding::Json => serde_json::to_vec(payload)
                .map_err(|e| PublishError::SerializationFailed(e.to_string()))?,
        };
        Ok(Self::new(id, message_type, bytes).with_metadata(CONTENT_TYPE, encoding.content_type()))
    }

    /// Decode the payload using the encoding named in its metadata
    /// (bitcode when none is given).
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PublishError> {
        match self.encoding()? {
            Encoding::Bitcode => bitcode::deserialize(&self.payload)
                .map_err(|e| PublishError::SerializationFailed(e.to_string())),
            Encoding::Json => serde_json::from_slice(&self.payload)
                .map_err(|e| PublishError::SerializationFailed(e.to_string())),
        }
    }

    pub fn encoding(&self) -> Result<Encoding, PublishError> {
        match self.metadata(CONTENT_TYPE) {
            None => Ok(Encoding::Bitcode),
            Some(content_type) => Encoding::from_content_type(content_type).ok_or_else(|| {
                PublishError::SerializationFailed(format!(
                    "unsupported content type {}",
                    content_type
                ))
            }),
        }
    }

    /// Create an envelope with a string payload.
    pub fn with_string_payload(
        id: impl Into<String>,
        message_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self::new(id, message_type, payload.into().into_bytes())
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    /// First metadata value under `key`.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}
