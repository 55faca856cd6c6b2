//! Typed messages exchanged with the document channel.
//!
//! The transport is external. It is assumed to deliver messages for one
//! document reliably and in the order the ordering authority broadcasts them.
//! Messages are adjacently tagged on the wire:
//! `{"event": "text_operation", "data": {...}}`.

use crate::document::DocumentId;
use crate::operation::Operation;
use crate::presence::{CursorData, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A collaborator listed by the ordering authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    /// Collaborator ID
    pub user_id: UserId,
    /// Display name
    pub username: String,
}

/// Messages a peer sends to the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Ask to join a document's room
    JoinDocument {
        /// Document to join
        document_id: DocumentId,
    },
    /// Leave a document's room
    LeaveDocument {
        /// Document to leave
        document_id: DocumentId,
    },
    /// A local edit
    TextOperation {
        /// Edited document
        document_id: DocumentId,
        /// The edit
        operation: Operation,
    },
    /// The local cursor moved
    CursorUpdate {
        /// Document the cursor is in
        document_id: DocumentId,
        /// Cursor payload
        cursor_data: CursorData,
    },
    /// Ask the storage service to persist the document
    SaveDocument {
        /// Document to save
        document_id: DocumentId,
    },
}

impl OutboundMessage {
    /// Document this message is about.
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::JoinDocument { document_id }
            | Self::LeaveDocument { document_id }
            | Self::TextOperation { document_id, .. }
            | Self::CursorUpdate { document_id, .. }
            | Self::SaveDocument { document_id } => document_id,
        }
    }
}

/// Messages a peer receives from the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Join acknowledged, with the authoritative document state
    DocumentJoined {
        /// Authoritative content
        content: String,
        /// Collaborators currently in the room
        #[serde(default)]
        active_users: Vec<Collaborator>,
    },
    /// Another collaborator joined
    UserJoined {
        /// Collaborator ID
        user_id: UserId,
        /// Display name
        username: String,
    },
    /// A collaborator left
    UserLeft {
        /// Collaborator ID
        user_id: UserId,
    },
    /// Another peer's operation, already sequenced
    TextOperation {
        /// The operation
        operation: Operation,
    },
    /// The oldest unacknowledged local operation was sequenced
    OperationAck,
    /// Another collaborator's cursor moved
    CursorUpdate {
        /// Collaborator ID
        user_id: UserId,
        /// Display name
        username: String,
        /// Cursor payload
        cursor_data: CursorData,
    },
    /// The storage service persisted the document
    DocumentSaved {
        /// When the save completed, if reported
        #[serde(default)]
        saved_at: Option<DateTime<Utc>>,
    },
    /// The channel reported an error
    Error {
        /// Human-readable description
        message: String,
    },
}

/// The outbound half of the document channel.
pub trait OutboundChannel {
    /// Hand a message to the transport.
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot accept the message.
    fn send(&mut self, message: OutboundMessage) -> Result<(), ChannelError>;
}

/// Errors from the outbound channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The transport is gone
    #[error("channel closed")]
    Closed,
    /// The transport refused the message
    #[error("send failed: {0}")]
    Send(String),
}
