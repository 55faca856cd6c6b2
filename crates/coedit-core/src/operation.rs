//! Text operations and their application to document content.
//!
//! Positions and lengths count Unicode scalar values (`char`s), so every
//! splice lands on a character boundary regardless of the encoding width of
//! the surrounding text.

use serde::{Deserialize, Serialize};

/// An atomic, positionally-addressed text edit.
///
/// Serializes to the channel wire shape
/// `{ "type": "insert"|"delete"|"replace", "position", "length"?, "text"? }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    /// Splice `text` in at `position`.
    Insert {
        /// Insertion point
        position: usize,
        /// Inserted text
        text: String,
    },
    /// Remove `length` characters starting at `position`.
    Delete {
        /// Start of the removed range
        position: usize,
        /// Number of removed characters
        length: usize,
    },
    /// Remove `length` characters at `position`, then insert `text` there.
    Replace {
        /// Start of the replaced range
        position: usize,
        /// Number of removed characters
        length: usize,
        /// Replacement text
        text: String,
    },
}

impl Operation {
    /// Create an insert operation.
    #[must_use]
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Self::Insert {
            position,
            text: text.into(),
        }
    }

    /// Create a delete operation.
    #[must_use]
    pub fn delete(position: usize, length: usize) -> Self {
        Self::Delete { position, length }
    }

    /// Create a replace operation.
    #[must_use]
    pub fn replace(position: usize, length: usize, text: impl Into<String>) -> Self {
        Self::Replace {
            position,
            length,
            text: text.into(),
        }
    }

    /// Position the operation is anchored at.
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::Insert { position, .. }
            | Self::Delete { position, .. }
            | Self::Replace { position, .. } => *position,
        }
    }

    /// Number of characters this operation removes (zero for inserts).
    #[must_use]
    pub fn deleted_len(&self) -> usize {
        match self {
            Self::Insert { .. } => 0,
            Self::Delete { length, .. } | Self::Replace { length, .. } => *length,
        }
    }

    /// Text this operation inserts (empty for deletes).
    #[must_use]
    pub fn inserted_text(&self) -> &str {
        match self {
            Self::Insert { text, .. } | Self::Replace { text, .. } => text,
            Self::Delete { .. } => "",
        }
    }

    /// Whether applying this operation can never change any content.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.deleted_len() == 0 && self.inserted_text().is_empty()
    }

    /// Short name used in logs and on the wire.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Delete { .. } => "delete",
            Self::Replace { .. } => "replace",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insert { position, text } => write!(f, "insert@{position} {text:?}"),
            Self::Delete { position, length } => write!(f, "delete@{position}+{length}"),
            Self::Replace {
                position,
                length,
                text,
            } => write!(f, "replace@{position}+{length} {text:?}"),
        }
    }
}

/// How out-of-range lengths are treated when applying an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClampPolicy {
    /// Clamp the removed range to the end of the content
    #[default]
    Clamp,
    /// Reject operations whose removed range runs past the end
    Strict,
}

impl ClampPolicy {
    /// Apply `op` to `content` under this policy.
    ///
    /// # Errors
    ///
    /// See [`apply`] and [`apply_strict`].
    pub fn apply(self, content: &str, op: &Operation) -> Result<String, OpError> {
        match self {
            Self::Clamp => apply(content, op),
            Self::Strict => apply_strict(content, op),
        }
    }
}

/// Errors from applying an operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpError {
    /// The operation starts past the end of the content
    #[error("position {position} out of bounds for content of length {len}")]
    OutOfBounds {
        /// Requested position
        position: usize,
        /// Content length in characters
        len: usize,
    },
    /// The removed range runs past the end of the content (strict mode only)
    #[error("range {position}+{length} exceeds content of length {len}")]
    LengthOverflow {
        /// Start of the removed range
        position: usize,
        /// Requested removal length
        length: usize,
        /// Content length in characters
        len: usize,
    },
}

/// Apply `op` to `content`, returning the new content.
///
/// The removed range of a delete or replace is clamped to the end of the
/// content instead of failing.
///
/// # Errors
///
/// Returns [`OpError::OutOfBounds`] if the operation starts past the end of
/// the content.
pub fn apply(content: &str, op: &Operation) -> Result<String, OpError> {
    splice(content, op, ClampPolicy::Clamp)
}

/// Like [`apply`], but an overlong removal is an error instead of a clamp.
///
/// # Errors
///
/// Returns [`OpError::OutOfBounds`] or [`OpError::LengthOverflow`].
pub fn apply_strict(content: &str, op: &Operation) -> Result<String, OpError> {
    splice(content, op, ClampPolicy::Strict)
}

fn splice(content: &str, op: &Operation, policy: ClampPolicy) -> Result<String, OpError> {
    let len = content.chars().count();
    let position = op.position();
    if position > len {
        return Err(OpError::OutOfBounds { position, len });
    }

    let length = op.deleted_len();
    let available = len - position;
    if length > available && policy == ClampPolicy::Strict {
        return Err(OpError::LengthOverflow {
            position,
            length,
            len,
        });
    }
    let end = position + length.min(available);

    let start_byte = byte_offset(content, position);
    let end_byte = byte_offset(content, end);
    let text = op.inserted_text();

    let mut out = String::with_capacity(content.len() - (end_byte - start_byte) + text.len());
    out.push_str(&content[..start_byte]);
    out.push_str(text);
    out.push_str(&content[end_byte..]);
    Ok(out)
}

/// Byte offset of the `index`-th character, or `content.len()` past the end.
pub(crate) fn byte_offset(content: &str, index: usize) -> usize {
    content
        .char_indices()
        .nth(index)
        .map_or(content.len(), |(offset, _)| offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_splices_text() {
        let op = Operation::insert(5, " World");
        assert_eq!(apply("Hello", &op).unwrap(), "Hello World");
        assert_eq!(apply("Hello", &Operation::insert(0, ">")).unwrap(), ">Hello");
    }

    #[test]
    fn delete_removes_range() {
        let op = Operation::delete(0, 6);
        assert_eq!(apply("Hello World", &op).unwrap(), "World");
    }

    #[test]
    fn replace_removes_then_inserts() {
        let op = Operation::replace(0, 5, "Howdy");
        assert_eq!(apply("Hello World", &op).unwrap(), "Howdy World");
    }

    #[test]
    fn out_of_bounds_position_is_rejected() {
        let err = apply("abc", &Operation::insert(4, "x")).unwrap_err();
        assert_eq!(err, OpError::OutOfBounds { position: 4, len: 3 });
    }

    #[test]
    fn delete_at_end_clamps_to_noop() {
        let content = "hello";
        let op = Operation::delete(content.len(), 5);
        assert_eq!(apply(content, &op).unwrap(), content);
    }

    #[test]
    fn overlong_delete_is_clamped() {
        assert_eq!(apply("hello", &Operation::delete(2, 100)).unwrap(), "he");
        assert_eq!(apply("hello", &Operation::replace(3, 9, "p!")).unwrap(), "help!");
    }

    #[test]
    fn strict_apply_rejects_overlong_delete() {
        let err = apply_strict("hello", &Operation::delete(2, 100)).unwrap_err();
        assert_eq!(
            err,
            OpError::LengthOverflow {
                position: 2,
                length: 100,
                len: 5
            }
        );
        assert_eq!(apply_strict("hello", &Operation::delete(2, 3)).unwrap(), "he");
    }

    #[test]
    fn positions_count_characters() {
        let content = "héllo wörld";
        assert_eq!(apply(content, &Operation::delete(1, 1)).unwrap(), "hllo wörld");
        assert_eq!(
            apply(content, &Operation::replace(7, 1, "o")).unwrap(),
            "héllo world"
        );
        assert_eq!(apply("日本", &Operation::insert(1, "の")).unwrap(), "日の本");
    }

    #[test]
    fn wire_shape() {
        let insert = serde_json::to_value(Operation::insert(5, " World")).unwrap();
        assert_eq!(
            insert,
            serde_json::json!({"type": "insert", "position": 5, "text": " World"})
        );

        let delete: Operation =
            serde_json::from_value(serde_json::json!({"type": "delete", "position": 3, "length": 2}))
                .unwrap();
        assert_eq!(delete, Operation::delete(3, 2));

        let replace = serde_json::to_value(Operation::replace(0, 5, "Hi")).unwrap();
        assert_eq!(
            replace,
            serde_json::json!({"type": "replace", "position": 0, "length": 5, "text": "Hi"})
        );
    }

    #[test]
    fn noop_detection() {
        assert!(Operation::insert(3, "").is_noop());
        assert!(Operation::delete(3, 0).is_noop());
        assert!(!Operation::replace(0, 0, "x").is_noop());
    }
}
