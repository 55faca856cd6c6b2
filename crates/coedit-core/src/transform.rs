//! Transform rules for concurrent operations.
//!
//! [`transform`] rewrites an operation so it keeps its intent after another
//! operation has already been applied to the shared content. Rules are pure
//! position/length arithmetic and never look at the content itself.
//! Arithmetic saturates, so out-of-range input never wraps; applying the
//! result reports it instead.
//!
//! # Rules
//!
//! | `op` | `already_applied` | Result |
//! |------|-------------------|--------|
//! | Insert | Insert at or before | shifted right by inserted length |
//! | Insert | Delete starting before | shifted left, floored at delete start |
//! | Delete | Insert at or before start | shifted right by inserted length |
//! | Delete | Insert strictly inside | widened into a Replace that keeps the insert |
//! | Delete | Delete entirely before | shifted left by deleted length |
//! | Delete | Delete entirely after | unchanged |
//! | Delete | Overlapping delete | dropped (`None`) |
//! | any | Replace | transformed against its delete, then its insert |
//! | Replace | any | deletion part transformed, text re-attached |
//!
//! Ties between inserts at the same position favor `already_applied`. The
//! caller supplies the global application order; this module does not decide
//! which of two simultaneous operations went first. Callers that know the
//! order differs from application order use [`transform_with_tie`].

use crate::operation::Operation;

/// Which of two inserts at the same position ends up first in the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// The already-applied insert stays first; `op` shifts past it
    #[default]
    AppliedFirst,
    /// `op` stays first; it keeps its position
    OpFirst,
}

/// Rewrite `op` so it applies on top of content already changed by
/// `already_applied`.
///
/// Returns `None` when `op` no longer applies and must be discarded. That is a
/// normal outcome of overlapping deletes, not an error.
#[must_use]
pub fn transform(op: &Operation, already_applied: &Operation) -> Option<Operation> {
    transform_with_tie(op, already_applied, TieBreak::AppliedFirst)
}

/// [`transform`] with an explicit tie-break for inserts at the same position.
#[must_use]
pub fn transform_with_tie(
    op: &Operation,
    already_applied: &Operation,
    tie: TieBreak,
) -> Option<Operation> {
    match already_applied {
        Operation::Insert { position, text } => {
            transform_against_insert(op, *position, text, tie)
        }
        Operation::Delete { position, length } => {
            transform_against_delete(op, *position, *length, tie)
        }
        Operation::Replace {
            position,
            length,
            text,
        } => {
            let after_delete = transform_against_delete(op, *position, *length, tie)?;
            transform_against_insert(&after_delete, *position, text, tie)
        }
    }
}

/// Transform `op` against every operation in `applied`, in order.
///
/// Stops with `None` as soon as one step drops the operation.
#[must_use]
pub fn transform_all<'a, I>(op: &Operation, applied: I) -> Option<Operation>
where
    I: IntoIterator<Item = &'a Operation>,
{
    applied
        .into_iter()
        .try_fold(op.clone(), |acc, prior| transform(&acc, prior))
}

fn transform_against_insert(
    op: &Operation,
    at: usize,
    text: &str,
    tie: TieBreak,
) -> Option<Operation> {
    let inserted = text.chars().count();
    match op {
        Operation::Insert { position, text: own } => {
            let shifts = at < *position || (at == *position && tie == TieBreak::AppliedFirst);
            let position = if shifts {
                position.saturating_add(inserted)
            } else {
                *position
            };
            Some(Operation::Insert {
                position,
                text: own.clone(),
            })
        }
        Operation::Delete { position, length } => {
            if at <= *position {
                Some(Operation::Delete {
                    position: position.saturating_add(inserted),
                    length: *length,
                })
            } else if at < position.saturating_add(*length) {
                // Remove the original range around the concurrent insert but
                // keep the inserted text in place.
                Some(Operation::Replace {
                    position: *position,
                    length: length.saturating_add(inserted),
                    text: text.to_string(),
                })
            } else {
                Some(op.clone())
            }
        }
        Operation::Replace { .. } => transform_replace(op, &Operation::insert(at, text), tie),
    }
}

fn transform_against_delete(
    op: &Operation,
    at: usize,
    removed: usize,
    tie: TieBreak,
) -> Option<Operation> {
    match op {
        Operation::Insert { position, text } => {
            let position = if at < *position {
                position.saturating_sub(removed).max(at)
            } else {
                *position
            };
            Some(Operation::Insert {
                position,
                text: text.clone(),
            })
        }
        Operation::Delete { position, length } => {
            let end = position.saturating_add(*length);
            if at.saturating_add(removed) <= *position {
                Some(Operation::Delete {
                    position: position - removed,
                    length: *length,
                })
            } else if at >= end {
                Some(op.clone())
            } else {
                tracing::debug!(
                    op = %op,
                    applied_position = at,
                    applied_length = removed,
                    "Dropping delete that overlaps an applied delete"
                );
                None
            }
        }
        Operation::Replace { .. } => transform_replace(op, &Operation::delete(at, removed), tie),
    }
}

/// Transform a replace by splitting it into its deletion and its text.
fn transform_replace(
    op: &Operation,
    already_applied: &Operation,
    tie: TieBreak,
) -> Option<Operation> {
    let Operation::Replace {
        position,
        length,
        text,
    } = op
    else {
        return transform_with_tie(op, already_applied, tie);
    };

    let deletion = Operation::delete(*position, *length);
    match transform_with_tie(&deletion, already_applied, tie) {
        Some(Operation::Delete { position, length }) if length == 0 => Some(Operation::Insert {
            position,
            text: text.clone(),
        }),
        Some(Operation::Delete { position, length }) => Some(Operation::Replace {
            position,
            length,
            text: text.clone(),
        }),
        Some(Operation::Replace {
            position,
            length,
            text: kept,
        }) => Some(Operation::Replace {
            position,
            length,
            text: format!("{text}{kept}"),
        }),
        Some(Operation::Insert { position, .. }) => Some(Operation::Insert {
            position,
            text: text.clone(),
        }),
        // The deletion conflicted; the replacement text still goes in.
        None => transform_with_tie(
            &Operation::insert(*position, text.clone()),
            already_applied,
            tie,
        ),
    }
}
