//! Serializes remote operations against local edits for one document.
//!
//! The sequencer owns the [`DocumentBuffer`] and moves between two states:
//!
//! ```text
//!            receive_remote (Idle)
//!   Idle ─────────────────────────▶ Applying ──▶ Idle
//!    ▲                                 │
//!    │ drain_next                      │ receive_remote (Applying)
//!    └──────────── queue ◀─────────────┘
//! ```
//!
//! While `Applying`, the [`EditorHost`] is told about the new content and is
//! handed the sequencer itself. Anything it does re-entrantly is contained:
//! local edits are suppressed, since they are echoes of the remote change,
//! and remote operations go to the FIFO queue. Draining the queue is the
//! host's job: one [`Sequencer::drain_next`] per turn of its event loop.
//!
//! Local operations stay *unacknowledged* until the ordering authority
//! confirms them. Remote operations that arrive in the meantime were
//! sequenced before them, so they are transformed across the unacknowledged
//! list before being applied.

use crate::config::EngineConfig;
use crate::diff::diff;
use crate::document::DocumentBuffer;
use crate::operation::{ClampPolicy, OpError, Operation};
use crate::transform::{transform, transform_with_tie, TieBreak};
use std::collections::VecDeque;

/// Whether a remote apply is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerState {
    /// Ready to apply the next operation
    #[default]
    Idle,
    /// A remote operation is being applied
    Applying,
}

/// What happened to a remote operation handed to the sequencer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Applied to the buffer, producing `revision`
    Applied {
        /// Buffer revision after the apply
        revision: u64,
        /// The operation as applied, after transformation
        applied: Operation,
    },
    /// An apply was in progress; the operation waits in the queue
    Queued {
        /// Queue length including this operation
        depth: usize,
    },
    /// The operation conflicted with an unacknowledged local edit and no
    /// longer applies
    Dropped {
        /// The operation as received
        operation: Operation,
    },
    /// The operation was malformed; the buffer is unchanged
    Rejected {
        /// The operation as it would have been applied
        operation: Operation,
        /// Why it was rejected
        error: OpError,
    },
}

/// The editor that displays a document and is notified of remote changes.
pub trait EditorHost {
    /// Called after a remote operation changed the buffer.
    ///
    /// `sequencer` is still in [`SequencerState::Applying`]. A real editor
    /// reacts to a programmatic content update by firing its change handler,
    /// which lands in [`Sequencer::local_edit`] and is suppressed there.
    fn remote_applied(&mut self, sequencer: &mut Sequencer, op: &Operation, content: &str);
}

/// A host that ignores notifications.
impl EditorHost for () {
    fn remote_applied(&mut self, _: &mut Sequencer, _: &Operation, _: &str) {}
}

/// Per-document operation sequencer.
#[derive(Debug)]
pub struct Sequencer {
    buffer: DocumentBuffer,
    state: SequencerState,
    queue: VecDeque<Operation>,
    /// Local operations awaiting acknowledgement, rebased onto every remote
    /// operation applied since they were produced. `None` marks one that a
    /// remote operation made obsolete but that still awaits its ack.
    unacknowledged: VecDeque<Option<Operation>>,
    clamp_policy: ClampPolicy,
    max_unacknowledged: usize,
}

impl Sequencer {
    /// Open a document with `content`.
    #[must_use]
    pub fn new(content: impl Into<String>, config: &EngineConfig) -> Self {
        Self {
            buffer: DocumentBuffer::new(content),
            state: SequencerState::Idle,
            queue: VecDeque::new(),
            unacknowledged: VecDeque::new(),
            clamp_policy: config.clamp_policy,
            max_unacknowledged: config.max_unacknowledged,
        }
    }

    /// The document buffer.
    #[must_use]
    pub fn buffer(&self) -> &DocumentBuffer {
        &self.buffer
    }

    /// Current content of the document.
    #[must_use]
    pub fn content(&self) -> &str {
        self.buffer.content()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Number of remote operations waiting to be drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of local operations awaiting acknowledgement.
    #[must_use]
    pub fn unacknowledged(&self) -> usize {
        self.unacknowledged.len()
    }

    /// Turn the editor's new content into an operation to transmit.
    ///
    /// Returns `None` when nothing changed or when the call happened while a
    /// remote operation was being applied. In the latter case the edit is an
    /// echo of the remote change and must never be sent back out.
    pub fn local_edit(&mut self, new_content: &str) -> Option<Operation> {
        if self.state == SequencerState::Applying {
            tracing::trace!("Suppressed local edit during remote apply");
            return None;
        }

        let op = diff(self.buffer.content(), new_content)?;
        let revision = self.buffer.commit_local(new_content);

        if self.unacknowledged.len() >= self.max_unacknowledged {
            tracing::warn!(
                limit = self.max_unacknowledged,
                "Unacknowledged operation limit reached, forgetting the oldest"
            );
            self.unacknowledged.pop_front();
        }
        self.unacknowledged.push_back(Some(op.clone()));

        tracing::debug!(op = %op, revision, "Local edit");
        Some(op)
    }

    /// Mark the oldest unacknowledged local operation as sequenced.
    ///
    /// Returns `false` if there was nothing to acknowledge.
    pub fn acknowledge(&mut self) -> bool {
        self.unacknowledged.pop_front().is_some()
    }

    /// Hand a remote operation to the sequencer.
    ///
    /// Applies it immediately when idle with an empty queue. Otherwise it
    /// joins the back of the queue so arrival order is kept. Queued
    /// operations are not drained here.
    pub fn receive_remote(&mut self, op: Operation, host: &mut dyn EditorHost) -> RemoteOutcome {
        if self.state == SequencerState::Applying || !self.queue.is_empty() {
            self.queue.push_back(op);
            let depth = self.queue.len();
            tracing::debug!(depth, state = ?self.state, "Queued remote operation");
            return RemoteOutcome::Queued { depth };
        }
        self.apply_remote(op, host)
    }

    /// Apply the oldest queued remote operation, if any.
    ///
    /// Returns `None` when the queue is empty or an apply is in progress.
    pub fn drain_next(&mut self, host: &mut dyn EditorHost) -> Option<RemoteOutcome> {
        if self.state == SequencerState::Applying {
            return None;
        }
        let op = self.queue.pop_front()?;
        Some(self.apply_remote(op, host))
    }

    /// Replace the content wholesale, e.g. with the authoritative content
    /// received on join. Pending and unacknowledged operations are forgotten.
    pub fn reset(&mut self, content: &str) -> u64 {
        self.queue.clear();
        self.unacknowledged.clear();
        self.buffer.replace(content)
    }

    /// Discard queued remote operations, returning how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        discarded
    }

    /// Stop tracking local operations that were never acknowledged.
    pub fn forget_unacknowledged(&mut self) {
        self.unacknowledged.clear();
    }

    fn apply_remote(&mut self, op: Operation, host: &mut dyn EditorHost) -> RemoteOutcome {
        let len = self.authority_len_bound();
        if op.position() > len {
            let error = OpError::OutOfBounds {
                position: op.position(),
                len,
            };
            tracing::warn!(op = %op, %error, "Rejected remote operation outside the document");
            return RemoteOutcome::Rejected {
                operation: op,
                error,
            };
        }

        let Some((applied, rebased)) = self.rebase_remote(&op) else {
            tracing::warn!(op = %op, "Remote operation conflicts with a local edit, dropped");
            return RemoteOutcome::Dropped { operation: op };
        };

        self.state = SequencerState::Applying;
        let revision = match self.buffer.apply(&applied, self.clamp_policy) {
            Ok(revision) => revision,
            Err(error) => {
                self.state = SequencerState::Idle;
                tracing::warn!(op = %applied, %error, "Rejected malformed remote operation");
                return RemoteOutcome::Rejected {
                    operation: applied,
                    error,
                };
            }
        };
        self.unacknowledged = rebased;

        tracing::debug!(op = %applied, revision, "Applied remote operation");
        let content = self.buffer.content().to_owned();
        host.remote_applied(self, &applied, &content);
        self.state = SequencerState::Idle;

        RemoteOutcome::Applied { revision, applied }
    }

    /// Upper bound on the content length the ordering authority saw when it
    /// sequenced a remote operation: the local content without the
    /// unacknowledged local edits' insertions.
    fn authority_len_bound(&self) -> usize {
        self.unacknowledged
            .iter()
            .flatten()
            .fold(self.buffer.len(), |len, local| {
                len.saturating_add(local.deleted_len())
            })
    }

    /// Transform `remote` across the unacknowledged local operations.
    ///
    /// Returns the operation to apply locally and the local operations
    /// rebased onto it, or `None` if `remote` was dropped along the way.
    fn rebase_remote(
        &self,
        remote: &Operation,
    ) -> Option<(Operation, VecDeque<Option<Operation>>)> {
        let mut incoming = remote.clone();
        let mut rebased = VecDeque::with_capacity(self.unacknowledged.len());

        for local in &self.unacknowledged {
            let Some(local) = local else {
                rebased.push_back(None);
                continue;
            };
            // `remote` was sequenced before `local`, so it wins insert ties.
            let next = transform_with_tie(&incoming, local, TieBreak::OpFirst)?;
            rebased.push_back(transform(local, &incoming));
            incoming = next;
        }

        Some((incoming, rebased))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records notifications and optionally misbehaves like a real editor.
    #[derive(Default)]
    struct RecordingHost {
        seen: Vec<String>,
        echo_local_edit: bool,
        echoes: Vec<Option<Operation>>,
        inject_remote: Vec<Operation>,
    }

    impl EditorHost for RecordingHost {
        fn remote_applied(&mut self, sequencer: &mut Sequencer, _op: &Operation, content: &str) {
            self.seen.push(content.to_string());
            if self.echo_local_edit {
                self.echoes.push(sequencer.local_edit(content));
                self.echoes.push(sequencer.local_edit(&format!("{content}?")));
            }
            for (i, op) in std::mem::take(&mut self.inject_remote).into_iter().enumerate() {
                let outcome = sequencer.receive_remote(op, &mut ());
                assert_eq!(outcome, RemoteOutcome::Queued { depth: i + 1 });
            }
        }
    }

    fn sequencer(content: &str) -> Sequencer {
        Sequencer::new(content, &EngineConfig::default())
    }

    #[test]
    fn remote_operation_applies_when_idle() {
        let mut seq = sequencer("Hello");
        let mut host = RecordingHost::default();
        let outcome = seq.receive_remote(Operation::insert(5, "!"), &mut host);

        assert_eq!(
            outcome,
            RemoteOutcome::Applied {
                revision: 1,
                applied: Operation::insert(5, "!")
            }
        );
        assert_eq!(seq.content(), "Hello!");
        assert_eq!(host.seen, vec!["Hello!".to_string()]);
        assert_eq!(seq.state(), SequencerState::Idle);
    }

    #[test]
    fn local_edit_produces_operation() {
        let mut seq = sequencer("Hello");
        assert_eq!(
            seq.local_edit("Hello World"),
            Some(Operation::insert(5, " World"))
        );
        assert_eq!(seq.local_edit("Hello World"), None);
        assert_eq!(seq.buffer().revision(), 1);
        assert_eq!(seq.unacknowledged(), 1);
    }

    #[test]
    fn local_edit_during_apply_is_not_echoed() {
        let mut seq = sequencer("abc");
        let mut host = RecordingHost {
            echo_local_edit: true,
            ..RecordingHost::default()
        };

        seq.receive_remote(Operation::insert(3, "d"), &mut host);

        assert_eq!(host.echoes, vec![None, None]);
        assert_eq!(seq.content(), "abcd");
        assert_eq!(seq.unacknowledged(), 0);
        // The editor now matches the buffer, so its next change event is silent.
        assert_eq!(seq.local_edit("abcd"), None);
    }

    #[test]
    fn remote_during_apply_is_queued_then_drained_in_order() {
        let mut seq = sequencer("");
        let mut host = RecordingHost {
            inject_remote: vec![Operation::insert(1, "b"), Operation::insert(2, "c")],
            ..RecordingHost::default()
        };

        seq.receive_remote(Operation::insert(0, "a"), &mut host);
        assert_eq!(seq.content(), "a");
        assert_eq!(seq.pending(), 2);

        let drained = seq.drain_next(&mut host);
        assert!(matches!(drained, Some(RemoteOutcome::Applied { revision: 2, .. })));
        assert_eq!(seq.content(), "ab");

        seq.drain_next(&mut host);
        assert_eq!(seq.content(), "abc");
        assert_eq!(seq.drain_next(&mut host), None);
        assert_eq!(host.seen, vec!["a", "ab", "abc"]);
    }

    #[test]
    fn arrivals_behind_a_queue_wait_their_turn() {
        let mut seq = sequencer("");
        let mut host = RecordingHost {
            inject_remote: vec![Operation::insert(1, "b")],
            ..RecordingHost::default()
        };
        seq.receive_remote(Operation::insert(0, "a"), &mut host);

        let outcome = seq.receive_remote(Operation::insert(2, "c"), &mut host);
        assert_eq!(outcome, RemoteOutcome::Queued { depth: 2 });
        while seq.drain_next(&mut host).is_some() {}
        assert_eq!(seq.content(), "abc");
    }

    #[test]
    fn malformed_remote_leaves_buffer_unchanged() {
        let mut seq = sequencer("abc");
        let outcome = seq.receive_remote(Operation::delete(10, 1), &mut ());
        assert_eq!(
            outcome,
            RemoteOutcome::Rejected {
                operation: Operation::delete(10, 1),
                error: OpError::OutOfBounds { position: 10, len: 3 },
            }
        );
        assert_eq!(seq.content(), "abc");
        assert_eq!(seq.buffer().revision(), 0);
        assert_eq!(seq.state(), SequencerState::Idle);
    }

    #[test]
    fn strict_policy_rejects_overlong_delete() {
        let config = EngineConfig {
            clamp_policy: ClampPolicy::Strict,
            ..EngineConfig::default()
        };
        let mut seq = Sequencer::new("abc", &config);
        let outcome = seq.receive_remote(Operation::delete(1, 5), &mut ());
        assert!(matches!(
            outcome,
            RemoteOutcome::Rejected {
                error: OpError::LengthOverflow { .. },
                ..
            }
        ));
        assert_eq!(seq.content(), "abc");
    }

    #[test]
    fn out_of_range_remote_is_rejected_with_local_edit_pending() {
        let mut seq = sequencer("Hello");
        seq.local_edit("abHello");

        let outcome = seq.receive_remote(Operation::insert(usize::MAX, "x"), &mut ());
        assert_eq!(
            outcome,
            RemoteOutcome::Rejected {
                operation: Operation::insert(usize::MAX, "x"),
                error: OpError::OutOfBounds {
                    position: usize::MAX,
                    len: 7
                },
            }
        );
        assert_eq!(seq.content(), "abHello");
        assert_eq!(seq.unacknowledged(), 1);
        assert_eq!(seq.state(), SequencerState::Idle);
    }

    #[test]
    fn overlong_remote_delete_with_local_edit_pending() {
        let mut seq = sequencer("Hello");
        seq.local_edit("abHello");
        let outcome = seq.receive_remote(Operation::delete(3, usize::MAX), &mut ());
        assert_eq!(
            outcome,
            RemoteOutcome::Applied {
                revision: 2,
                applied: Operation::delete(5, usize::MAX)
            }
        );
        assert_eq!(seq.content(), "abHel");

        let config = EngineConfig {
            clamp_policy: ClampPolicy::Strict,
            ..EngineConfig::default()
        };
        let mut strict = Sequencer::new("Hello", &config);
        strict.local_edit("abHello");
        let outcome = strict.receive_remote(Operation::delete(3, usize::MAX), &mut ());
        assert!(matches!(
            outcome,
            RemoteOutcome::Rejected {
                error: OpError::LengthOverflow { .. },
                ..
            }
        ));
        assert_eq!(strict.content(), "abHello");
        assert_eq!(strict.unacknowledged(), 1);
    }

    #[test]
    fn remote_may_address_text_removed_by_a_local_edit() {
        // The authority has not seen the local removal of " World" yet.
        let mut seq = sequencer("Hello World");
        seq.local_edit("Hello");

        let outcome = seq.receive_remote(Operation::insert(11, "!"), &mut ());
        assert!(matches!(outcome, RemoteOutcome::Applied { .. }));
        assert_eq!(seq.content(), "Hello!");
    }

    #[test]
    fn transport_loss_discards_queued_remotes() {
        let mut seq = sequencer("");
        let mut host = RecordingHost {
            inject_remote: vec![Operation::insert(1, "b"), Operation::insert(2, "c")],
            ..RecordingHost::default()
        };
        seq.receive_remote(Operation::insert(0, "a"), &mut host);
        assert_eq!(seq.pending(), 2);

        assert_eq!(seq.discard_pending(), 2);
        assert_eq!(seq.drain_next(&mut host), None);
        assert_eq!(seq.content(), "a");
    }

    #[test]
    fn remote_is_rebased_over_unacknowledged_local_edit() {
        // B typed "Hi " locally; A's earlier-sequenced op arrives before B's ack.
        let mut seq = sequencer("Hello");
        seq.local_edit("Hi Hello");

        let outcome = seq.receive_remote(Operation::insert(5, " World"), &mut ());
        assert_eq!(
            outcome,
            RemoteOutcome::Applied {
                revision: 2,
                applied: Operation::insert(8, " World")
            }
        );
        assert_eq!(seq.content(), "Hi Hello World");

        assert!(seq.acknowledge());
        assert!(!seq.acknowledge());
    }

    #[test]
    fn acknowledged_edits_are_not_rebased() {
        let mut seq = sequencer("Hello");
        seq.local_edit("Hi Hello");
        seq.acknowledge();

        // The remote op was sequenced after ours and already accounts for it.
        seq.receive_remote(Operation::insert(8, "!"), &mut ());
        assert_eq!(seq.content(), "Hi Hello!");
    }

    #[test]
    fn conflicting_remote_delete_is_dropped() {
        let mut seq = sequencer("hello world");
        seq.local_edit(" world");

        let outcome = seq.receive_remote(Operation::delete(3, 5), &mut ());
        assert_eq!(
            outcome,
            RemoteOutcome::Dropped {
                operation: Operation::delete(3, 5)
            }
        );
        assert_eq!(seq.content(), " world");
    }

    #[test]
    fn unacknowledged_list_is_bounded() {
        let config = EngineConfig {
            max_unacknowledged: 2,
            ..EngineConfig::default()
        };
        let mut seq = Sequencer::new("", &config);
        seq.local_edit("a");
        seq.local_edit("ab");
        seq.local_edit("abc");
        assert_eq!(seq.unacknowledged(), 2);
    }

    #[test]
    fn reset_forgets_pending_work() {
        let mut seq = sequencer("old");
        seq.local_edit("older");
        assert_eq!(seq.reset("authoritative"), 2);
        assert_eq!(seq.content(), "authoritative");
        assert_eq!(seq.unacknowledged(), 0);
        assert_eq!(seq.pending(), 0);
    }
}
