//! Frames carried on a document channel.

use coedit_core::{DocumentId, InboundMessage, OutboundMessage, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Encoding used for frames on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// UTF-8 JSON
    #[default]
    Json,
    /// CBOR
    Cbor,
}

impl std::str::FromStr for WireFormat {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "cbor" => Ok(Self::Cbor),
            other => Err(MessageError::UnknownFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for WireFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Cbor => write!(f, "cbor"),
        }
    }
}

/// A peer's outbound message as published to the ordering authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Connection identifier of the sending peer
    pub client_id: Uuid,
    /// Collaborator who produced the message
    pub user_id: UserId,
    /// Display name of the collaborator
    pub username: String,
    /// The message
    pub message: OutboundMessage,
}

impl ClientFrame {
    /// Create a new client frame.
    #[must_use]
    pub fn new(
        client_id: Uuid,
        user_id: UserId,
        username: impl Into<String>,
        message: OutboundMessage,
    ) -> Self {
        Self {
            client_id,
            user_id,
            username: username.into(),
            message,
        }
    }

    /// Serialize in the given format.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn encode(&self, format: WireFormat) -> Result<Vec<u8>, MessageError> {
        encode(self, format)
    }

    /// Deserialize from the given format.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn decode(bytes: &[u8], format: WireFormat) -> Result<Self, MessageError> {
        decode(bytes, format)
    }
}

/// A message broadcast by the ordering authority for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFrame {
    /// Document the message belongs to
    pub document_id: DocumentId,
    /// Peer the message is addressed to; `None` for room-wide broadcasts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Uuid>,
    /// The message
    pub message: InboundMessage,
}

impl ServerFrame {
    /// Create a room-wide frame.
    #[must_use]
    pub fn broadcast(document_id: DocumentId, message: InboundMessage) -> Self {
        Self {
            document_id,
            recipient: None,
            message,
        }
    }

    /// Create a frame addressed to one peer.
    #[must_use]
    pub fn to_client(document_id: DocumentId, recipient: Uuid, message: InboundMessage) -> Self {
        Self {
            document_id,
            recipient: Some(recipient),
            message,
        }
    }

    /// Whether the peer with `client_id` should handle this frame.
    #[must_use]
    pub fn is_for(&self, client_id: Uuid) -> bool {
        self.recipient.map_or(true, |recipient| recipient == client_id)
    }

    /// Serialize in the given format.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn encode(&self, format: WireFormat) -> Result<Vec<u8>, MessageError> {
        encode(self, format)
    }

    /// Deserialize from the given format.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn decode(bytes: &[u8], format: WireFormat) -> Result<Self, MessageError> {
        decode(bytes, format)
    }
}

fn encode<T: Serialize>(value: &T, format: WireFormat) -> Result<Vec<u8>, MessageError> {
    match format {
        WireFormat::Json => {
            serde_json::to_vec(value).map_err(|e| MessageError::Serialize(e.to_string()))
        }
        WireFormat::Cbor => {
            let mut bytes = Vec::new();
            ciborium::into_writer(value, &mut bytes)
                .map_err(|e| MessageError::Serialize(e.to_string()))?;
            Ok(bytes)
        }
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8], format: WireFormat) -> Result<T, MessageError> {
    match format {
        WireFormat::Json => {
            serde_json::from_slice(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
        }
        WireFormat::Cbor => {
            ciborium::from_reader(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
        }
    }
}

/// Errors for frame serialization/deserialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialize(String),
    /// Unknown wire format name
    #[error("unknown wire format: {0}")]
    UnknownFormat(String),
}
