//! Session lifecycle for one open document.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──on_connected──▶ Connected
//!      ▲                                                     │
//!      │ leave_document / on_disconnected      document_joined
//!      │                                                     ▼
//!      └──────────────────────────────────────────────── Joined
//!
//! any ──on_transport_error──▶ Error ──connect──▶ Connecting
//! ```
//!
//! A `Session` is an explicit object owned by the caller. It owns the
//! document's [`Sequencer`] and [`PresenceTracker`] and talks to the outside
//! world only through an [`OutboundChannel`] and the [`SessionEvent`] queue.

use crate::channel::{ChannelError, Collaborator, InboundMessage, OutboundChannel, OutboundMessage};
use crate::config::EngineConfig;
use crate::document::DocumentId;
use crate::operation::{OpError, Operation};
use crate::presence::{CursorData, CursorState, PresenceTracker, UserId};
use crate::sequencer::{EditorHost, RemoteOutcome, Sequencer};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport connection
    #[default]
    Disconnected,
    /// Transport connection requested
    Connecting,
    /// Transport connected, document not joined
    Connected,
    /// Document joined; edits and presence flow
    Joined,
    /// Transport failed
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Joined => "joined",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Something the caller may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection state changed
    StateChanged {
        /// Previous state
        from: ConnectionState,
        /// New state
        to: ConnectionState,
    },
    /// Authoritative content replaced the local buffer on join
    ContentReplaced {
        /// The new content
        content: String,
        /// Length in characters of the content that was discarded
        discarded_len: usize,
    },
    /// A remote operation changed the content
    RemoteApplied {
        /// The operation as applied
        operation: Operation,
        /// Content after the apply
        content: String,
    },
    /// A remote operation no longer applied and was discarded
    OperationDropped {
        /// The discarded operation
        operation: Operation,
    },
    /// A malformed remote operation was ignored
    OperationRejected {
        /// The rejected operation
        operation: Operation,
        /// Why it was rejected
        error: OpError,
    },
    /// A collaborator joined
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
    /// The document was saved by the storage service
    DocumentSaved {
        /// When the save completed, if reported
        saved_at: Option<DateTime<Utc>>,
    },
    /// The channel or transport reported an error
    Error {
        /// Human-readable description
        message: String,
    },
}

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The action requires a joined document
    #[error("document not joined (state: {state})")]
    NotJoined {
        /// Current state
        state: ConnectionState,
    },
    /// The action is not valid in the current state
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        /// Attempted action
        action: &'static str,
        /// Current state
        state: ConnectionState,
    },
    /// The outbound channel failed
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// A collaborative editing session for one document.
pub struct Session<C> {
    document_id: DocumentId,
    user_id: UserId,
    state: ConnectionState,
    active_users: HashSet<UserId>,
    sequencer: Sequencer,
    presence: PresenceTracker,
    channel: C,
    events: VecDeque<SessionEvent>,
}

impl<C: OutboundChannel> Session<C> {
    /// Open `document_id` with the locally held `content`.
    #[must_use]
    pub fn new(
        document_id: DocumentId,
        user_id: UserId,
        content: impl Into<String>,
        channel: C,
        config: &EngineConfig,
    ) -> Self {
        Self {
            document_id,
            user_id,
            state: ConnectionState::Disconnected,
            active_users: HashSet::new(),
            sequencer: Sequencer::new(content, config),
            presence: PresenceTracker::new(config),
            channel,
            events: VecDeque::new(),
        }
    }

    /// Document this session edits.
    #[must_use]
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Local collaborator.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current document content.
    #[must_use]
    pub fn content(&self) -> &str {
        self.sequencer.content()
    }

    /// The document's sequencer.
    #[must_use]
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Collaborators the ordering authority reported as present.
    #[must_use]
    pub fn active_users(&self) -> &HashSet<UserId> {
        &self.active_users
    }

    /// Live remote cursors.
    pub fn cursors(&mut self, now: DateTime<Utc>) -> impl Iterator<Item = &CursorState> {
        self.presence.cursors(now)
    }

    /// The outbound channel.
    #[must_use]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Take all queued events.
    pub fn poll_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Start connecting the transport.
    ///
    /// # Errors
    ///
    /// Returns error unless the session is disconnected or failed.
    pub fn connect(&mut self) -> Result<(), SessionError> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.transition(ConnectionState::Connecting);
                Ok(())
            }
            state => Err(SessionError::InvalidTransition {
                action: "connect",
                state,
            }),
        }
    }

    /// The transport acknowledged the connection.
    ///
    /// # Errors
    ///
    /// Returns error unless the session is connecting.
    pub fn on_connected(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connecting {
            return Err(SessionError::InvalidTransition {
                action: "acknowledge connection",
                state: self.state,
            });
        }
        self.transition(ConnectionState::Connected);
        Ok(())
    }

    /// Ask to join the document. The session becomes `Joined` when
    /// `document_joined` arrives.
    ///
    /// # Errors
    ///
    /// Returns error unless the session is connected, or if the send fails.
    pub fn join_document(&mut self) -> Result<(), SessionError> {
        if self.state != ConnectionState::Connected {
            return Err(SessionError::InvalidTransition {
                action: "join document",
                state: self.state,
            });
        }
        self.send(OutboundMessage::JoinDocument {
            document_id: self.document_id.clone(),
        })?;
        tracing::info!(document_id = %self.document_id, "Requested document join");
        Ok(())
    }

    /// Leave the document and tear the session down.
    ///
    /// # Errors
    ///
    /// Returns error unless the session is joined. The session is torn down
    /// even if the leave message cannot be sent.
    pub fn leave_document(&mut self) -> Result<(), SessionError> {
        self.require_joined()?;
        let sent = self.channel.send(OutboundMessage::LeaveDocument {
            document_id: self.document_id.clone(),
        });
        self.teardown();
        self.transition(ConnectionState::Disconnected);
        sent.map_err(SessionError::from)
    }

    /// The transport disconnected.
    pub fn on_disconnected(&mut self) {
        self.teardown();
        self.transition(ConnectionState::Disconnected);
    }

    /// The transport failed. Queued remote operations and presence are
    /// discarded.
    pub fn on_transport_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        let discarded = self.sequencer.discard_pending();
        tracing::error!(
            document_id = %self.document_id,
            error = %message,
            discarded,
            "Transport error"
        );
        self.teardown();
        self.transition(ConnectionState::Error);
        self.events.push_back(SessionEvent::Error { message });
    }

    /// Report the editor's new content; transmits the resulting operation.
    ///
    /// Returns the operation sent, or `None` if nothing needed sending.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not joined or the send fails. A
    /// failed send moves the session to `Error`; the unsent edit stays in
    /// the buffer until the next join replaces it.
    pub fn local_edit(&mut self, new_content: &str) -> Result<Option<Operation>, SessionError> {
        self.require_joined()?;
        let Some(operation) = self.sequencer.local_edit(new_content) else {
            return Ok(None);
        };
        self.send(OutboundMessage::TextOperation {
            document_id: self.document_id.clone(),
            operation: operation.clone(),
        })?;
        Ok(Some(operation))
    }

    /// Report the local cursor; sends it unless throttled.
    ///
    /// Returns whether an update was sent.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not joined or the send fails.
    pub fn update_cursor(
        &mut self,
        cursor: CursorData,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        self.require_joined()?;
        let Some(cursor_data) = self.presence.update_cursor(&self.user_id, cursor, now) else {
            return Ok(false);
        };
        self.send(OutboundMessage::CursorUpdate {
            document_id: self.document_id.clone(),
            cursor_data,
        })?;
        Ok(true)
    }

    /// Ask the storage service to persist the document.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not joined or the send fails.
    pub fn save(&mut self) -> Result<(), SessionError> {
        self.require_joined()?;
        self.send(OutboundMessage::SaveDocument {
            document_id: self.document_id.clone(),
        })?;
        Ok(())
    }

    /// Handle one inbound message.
    pub fn handle(&mut self, message: InboundMessage, host: &mut dyn EditorHost, now: DateTime<Utc>) {
        match message {
            InboundMessage::DocumentJoined {
                content,
                active_users,
            } => self.on_document_joined(&content, active_users),
            InboundMessage::UserJoined { user_id, username } => {
                if self.state == ConnectionState::Joined {
                    tracing::debug!(%user_id, username, "Collaborator joined");
                    self.active_users.insert(user_id.clone());
                    self.events
                        .push_back(SessionEvent::UserJoined { user_id, username });
                }
            }
            InboundMessage::UserLeft { user_id } => {
                if self.state == ConnectionState::Joined {
                    tracing::debug!(%user_id, "Collaborator left");
                    self.active_users.remove(&user_id);
                    self.presence.on_user_left(&user_id);
                    self.events.push_back(SessionEvent::UserLeft { user_id });
                }
            }
            InboundMessage::TextOperation { operation } => {
                if self.state != ConnectionState::Joined {
                    tracing::warn!(op = %operation, state = %self.state, "Ignoring operation outside a joined session");
                    return;
                }
                let outcome = self.sequencer.receive_remote(operation, host);
                self.record_outcome(outcome);
            }
            InboundMessage::OperationAck => {
                if !self.sequencer.acknowledge() {
                    tracing::warn!("Acknowledgement without an outstanding local operation");
                }
            }
            InboundMessage::CursorUpdate {
                user_id,
                username,
                cursor_data,
            } => {
                if self.state == ConnectionState::Joined && user_id != self.user_id {
                    self.presence
                        .record_remote_cursor(user_id, username, cursor_data, now);
                }
            }
            InboundMessage::DocumentSaved { saved_at } => {
                tracing::info!(document_id = %self.document_id, "Document saved");
                self.events.push_back(SessionEvent::DocumentSaved { saved_at });
            }
            InboundMessage::Error { message } => {
                tracing::warn!(document_id = %self.document_id, error = %message, "Channel error");
                self.events.push_back(SessionEvent::Error { message });
            }
        }
    }

    /// Apply the next queued remote operation, if any.
    ///
    /// Call once per event-loop turn until it returns `false`.
    pub fn drain_next(&mut self, host: &mut dyn EditorHost) -> bool {
        match self.sequencer.drain_next(host) {
            Some(outcome) => {
                self.record_outcome(outcome);
                true
            }
            None => false,
        }
    }

    fn on_document_joined(&mut self, content: &str, active_users: Vec<Collaborator>) {
        if self.state != ConnectionState::Connected {
            tracing::warn!(state = %self.state, "Ignoring document_joined outside a pending join");
            return;
        }

        self.sequencer.discard_pending();
        self.sequencer.forget_unacknowledged();
        if self.sequencer.content() != content {
            let discarded_len = self.sequencer.buffer().len();
            tracing::warn!(
                document_id = %self.document_id,
                local_len = discarded_len,
                authoritative_len = content.chars().count(),
                "Local content diverged on join, replacing with authoritative content"
            );
            self.sequencer.reset(content);
            self.events.push_back(SessionEvent::ContentReplaced {
                content: content.to_owned(),
                discarded_len,
            });
        }

        self.active_users = active_users.into_iter().map(|c| c.user_id).collect();
        self.transition(ConnectionState::Joined);
    }

    fn record_outcome(&mut self, outcome: RemoteOutcome) {
        let event = match outcome {
            RemoteOutcome::Applied { applied, .. } => SessionEvent::RemoteApplied {
                operation: applied,
                content: self.sequencer.content().to_owned(),
            },
            RemoteOutcome::Dropped { operation } => SessionEvent::OperationDropped { operation },
            RemoteOutcome::Rejected { operation, error } => {
                SessionEvent::OperationRejected { operation, error }
            }
            RemoteOutcome::Queued { .. } => return,
        };
        self.events.push_back(event);
    }

    fn require_joined(&self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Joined {
            Ok(())
        } else {
            Err(SessionError::NotJoined { state: self.state })
        }
    }

    /// Send on the channel. A failure is a transport error: the session
    /// moves to `Error` so nothing is left waiting on an unsent message.
    fn send(&mut self, message: OutboundMessage) -> Result<(), SessionError> {
        if let Err(err) = self.channel.send(message) {
            self.on_transport_error(err.to_string());
            return Err(err.into());
        }
        Ok(())
    }

    fn teardown(&mut self) {
        self.sequencer.discard_pending();
        self.sequencer.forget_unacknowledged();
        self.presence.clear();
        self.active_users.clear();
    }

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::info!(document_id = %self.document_id, %from, %to, "Session state changed");
        self.events.push_back(SessionEvent::StateChanged { from, to });
    }
}
