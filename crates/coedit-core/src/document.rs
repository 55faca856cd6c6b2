//! Document identity and the locally held document buffer.

use crate::operation::{ClampPolicy, OpError, Operation};
use serde::{Deserialize, Serialize};

/// Unique identifier for a shared document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new document ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hash used to shard topics: the first 8 bytes of the BLAKE3 digest of
    /// the identifier, as 16 hex digits. Stable across builds and platforms,
    /// so every peer derives the same topic.
    #[must_use]
    pub fn topic_hash(&self) -> String {
        let digest = blake3::hash(self.0.as_bytes());
        digest.to_hex()[..16].to_string()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The content of an open document plus its local revision counter.
///
/// Only the [`Sequencer`](crate::sequencer::Sequencer) mutates a buffer; the
/// mutating methods are crate-private.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentBuffer {
    content: String,
    revision: u64,
}

impl DocumentBuffer {
    /// Create a buffer holding `content` at revision zero.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            revision: 0,
        }
    }

    /// Current content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of operations applied since the buffer was opened.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Content length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    /// Check if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Apply an operation. On error the buffer is left unchanged.
    pub(crate) fn apply(&mut self, op: &Operation, policy: ClampPolicy) -> Result<u64, OpError> {
        self.content = policy.apply(&self.content, op)?;
        self.revision += 1;
        Ok(self.revision)
    }

    /// Record content that the local editor already holds.
    pub(crate) fn commit_local(&mut self, content: &str) -> u64 {
        content.clone_into(&mut self.content);
        self.revision += 1;
        self.revision
    }

    /// Swap in authoritative content wholesale.
    pub(crate) fn replace(&mut self, content: &str) -> u64 {
        self.commit_local(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_display() {
        let id = DocumentId::new("notes/42");
        assert_eq!(id.to_string(), "notes/42");
        assert_eq!(id.topic_hash().len(), 16);
        assert_eq!(id.topic_hash(), DocumentId::from("notes/42").topic_hash());
        assert_ne!(id.topic_hash(), DocumentId::new("notes/43").topic_hash());
    }

    #[test]
    fn topic_hash_is_a_fixed_digest() {
        // BLAKE3 of the empty input.
        assert_eq!(DocumentId::new("").topic_hash(), "af1349b9f5f9a1a6");
    }

    #[test]
    fn revision_counts_successful_applies() {
        let mut buffer = DocumentBuffer::new("Hello");
        assert_eq!(buffer.apply(&Operation::insert(5, "!"), ClampPolicy::Clamp), Ok(1));
        assert_eq!(buffer.content(), "Hello!");

        let err = buffer.apply(&Operation::insert(99, "?"), ClampPolicy::Clamp);
        assert!(err.is_err());
        assert_eq!(buffer.content(), "Hello!");
        assert_eq!(buffer.revision(), 1);

        assert_eq!(buffer.commit_local("Hello!!"), 2);
        assert_eq!(buffer.len(), 7);
    }
}
