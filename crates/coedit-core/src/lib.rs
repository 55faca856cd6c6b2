//! # coedit core
//!
//! Operational-transformation engine for collaborative plain-text editing.
//!
//! This crate provides:
//! - An operation model (insert/delete/replace) and pure application
//! - A single-edit diff from two observed document states
//! - Transform rules that rebase one operation over a concurrent one
//! - A sequencer that serializes remote operations against local edits
//! - Presence tracking for remote cursors
//! - A session state machine gating what may be sent on the channel
//!
//! Ordering is not decided here: the channel is expected to deliver each
//! document's operations in one total order.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod diff;
pub mod document;
pub mod operation;
pub mod presence;
pub mod sequencer;
pub mod session;
pub mod transform;

pub use channel::{ChannelError, Collaborator, InboundMessage, OutboundChannel, OutboundMessage};
pub use config::EngineConfig;
pub use diff::diff;
pub use document::{DocumentBuffer, DocumentId};
pub use operation::{apply, apply_strict, ClampPolicy, OpError, Operation};
pub use presence::{CursorData, CursorState, PresenceTracker, UserId};
pub use sequencer::{EditorHost, RemoteOutcome, Sequencer, SequencerState};
pub use session::{ConnectionState, Session, SessionError, SessionEvent};
pub use transform::{transform, transform_all, transform_with_tie, TieBreak};
