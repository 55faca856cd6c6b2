//! MQTT topic scheme for document rooms.
//!
//! Topic structure: `coedit/v1/{tenant}/{doc_hash}/{direction}`
//!
//! Peers publish to `client` and subscribe to `server`. The ordering
//! authority does the reverse, so each document's broadcasts come from a
//! single publisher on a single topic and keep their order.

use serde::{Deserialize, Serialize};

/// Protocol version for topic scheme.
pub const PROTOCOL_VERSION: &str = "v1";

/// Topic scheme configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Tenant identifier
    pub tenant: String,
    /// Topic prefix (default: "coedit")
    pub prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new("default")
    }
}

impl TopicScheme {
    /// Create a new topic scheme with the given tenant.
    #[must_use]
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            prefix: "coedit".to_string(),
        }
    }

    fn base(&self, doc_hash: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.prefix, PROTOCOL_VERSION, self.tenant, doc_hash
        )
    }

    /// Topic peers publish their frames to.
    #[must_use]
    pub fn client(&self, doc_hash: &str) -> String {
        format!("{}/{}", self.base(doc_hash), Direction::Client)
    }

    /// Topic the ordering authority broadcasts on.
    #[must_use]
    pub fn server(&self, doc_hash: &str) -> String {
        format!("{}/{}", self.base(doc_hash), Direction::Server)
    }

    /// Wildcard subscription for all client topics in the tenant.
    ///
    /// This is what an ordering authority subscribes to in order to sequence
    /// every document of a tenant; peers never need it.
    #[must_use]
    pub fn all_clients(&self) -> String {
        format!(
            "{}/{}/{}/+/{}",
            self.prefix,
            PROTOCOL_VERSION,
            self.tenant,
            Direction::Client
        )
    }

    /// Parse a topic to extract components.
    ///
    /// Returns `(doc_hash, direction)` if valid.
    #[must_use]
    pub fn parse(&self, topic: &str) -> Option<(String, Direction)> {
        let expected_prefix = format!("{}/{}/{}/", self.prefix, PROTOCOL_VERSION, self.tenant);
        let remainder = topic.strip_prefix(&expected_prefix)?;

        let (doc_hash, direction) = remainder.split_once('/')?;
        if doc_hash.is_empty() {
            return None;
        }
        let direction = match direction {
            "client" => Direction::Client,
            "server" => Direction::Server,
            _ => return None,
        };

        Some((doc_hash.to_string(), direction))
    }
}

/// Which side published on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Peer to ordering authority
    Client,
    /// Ordering authority to peers
    Server,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coedit_core::DocumentId;

    #[test]
    fn topic_generation() {
        let scheme = TopicScheme::new("team-a");
        let doc_hash = "abc123def456";

        assert_eq!(scheme.client(doc_hash), "coedit/v1/team-a/abc123def456/client");
        assert_eq!(scheme.server(doc_hash), "coedit/v1/team-a/abc123def456/server");
        assert_eq!(scheme.all_clients(), "coedit/v1/team-a/+/client");
    }

    #[test]
    fn topic_parsing() {
        let scheme = TopicScheme::new("team-a");

        let (doc_hash, direction) = scheme.parse("coedit/v1/team-a/abc123/server").unwrap();
        assert_eq!(doc_hash, "abc123");
        assert_eq!(direction, Direction::Server);

        assert!(scheme.parse("coedit/v1/team-b/abc123/server").is_none());
        assert!(scheme.parse("coedit/v1/team-a/abc123/presence").is_none());
        assert!(scheme.parse("coedit/v1/team-a/abc123").is_none());
    }

    #[test]
    fn document_topics_roundtrip() {
        let scheme = TopicScheme::default();
        let hash = DocumentId::new("notes/42").topic_hash();

        let (parsed, direction) = scheme.parse(&scheme.client(&hash)).unwrap();
        assert_eq!(parsed, hash);
        assert_eq!(direction, Direction::Client);
    }
}
