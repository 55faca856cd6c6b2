//! Single-edit diff between two observed states of a document.
//!
//! The changed region is found by trimming the longest common prefix and
//! then the longest common suffix that does not overlap it. Each local change
//! between two observations is assumed to be one contiguous edit, which holds
//! for keystroke-granularity input.

use crate::operation::Operation;

/// Compute the operation that turns `old` into `new`.
///
/// Returns `None` when the two are equal; nothing should be transmitted.
#[must_use]
pub fn diff(old: &str, new: &str) -> Option<Operation> {
    if old == new {
        return None;
    }

    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();
    let max_common = old_chars.len().min(new_chars.len());

    let prefix = old_chars
        .iter()
        .zip(&new_chars)
        .take_while(|(a, b)| a == b)
        .count();

    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(max_common - prefix)
        .take_while(|(a, b)| a == b)
        .count();

    let removed = old_chars.len() - suffix - prefix;
    let inserted: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();

    let op = match (removed, inserted.is_empty()) {
        (0, true) => return None,
        (0, false) => Operation::Insert {
            position: prefix,
            text: inserted,
        },
        (length, true) => Operation::Delete {
            position: prefix,
            length,
        },
        (length, false) => Operation::Replace {
            position: prefix,
            length,
            text: inserted,
        },
    };
    tracing::trace!(op = %op, "Computed local diff");
    Some(op)
}
