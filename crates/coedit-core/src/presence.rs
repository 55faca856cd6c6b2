//! Cursor and selection presence for collaborators.
//!
//! Presence is independent of document content: a stale or misplaced cursor
//! never affects convergence, so remote updates are simply last-write-wins.

use crate::config::EngineConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Cursor payload exchanged on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CursorData {
    /// Caret position
    pub position: usize,
    /// Start of the selected range
    pub selection_start: usize,
    /// End of the selected range
    pub selection_end: usize,
}

impl CursorData {
    /// A caret with no selection.
    #[must_use]
    pub fn caret(position: usize) -> Self {
        Self {
            position,
            selection_start: position,
            selection_end: position,
        }
    }

    /// A caret with a selected range.
    #[must_use]
    pub fn with_selection(position: usize, selection_start: usize, selection_end: usize) -> Self {
        Self {
            position,
            selection_start,
            selection_end,
        }
    }

    /// Whether any text is selected.
    #[must_use]
    pub fn has_selection(&self) -> bool {
        self.selection_start != self.selection_end
    }
}

/// Last known cursor of one remote collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    /// Collaborator ID
    pub user_id: UserId,
    /// Display name
    pub username: String,
    /// Caret position
    pub position: usize,
    /// Start of the selected range
    pub selection_start: usize,
    /// End of the selected range
    pub selection_end: usize,
    /// When the cursor was last reported
    pub last_updated: DateTime<Utc>,
}

impl CursorState {
    /// The cursor as a wire payload.
    #[must_use]
    pub fn cursor(&self) -> CursorData {
        CursorData::with_selection(self.position, self.selection_start, self.selection_end)
    }
}

/// Tracks remote cursors and throttles outbound local ones.
#[derive(Debug)]
pub struct PresenceTracker {
    cursors: HashMap<UserId, CursorState>,
    last_sent: HashMap<UserId, DateTime<Utc>>,
    ttl: Duration,
    throttle: Duration,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl PresenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cursors: HashMap::new(),
            last_sent: HashMap::new(),
            ttl: config.presence_ttl,
            throttle: config.cursor_throttle,
        }
    }

    /// Gate an outbound cursor update for `user_id`.
    ///
    /// Returns the payload to send, or `None` if an update for this user
    /// already went out within the throttle window. Dropped updates are not
    /// queued.
    pub fn update_cursor(
        &mut self,
        user_id: &UserId,
        cursor: CursorData,
        now: DateTime<Utc>,
    ) -> Option<CursorData> {
        if let Some(last) = self.last_sent.get(user_id) {
            if now.signed_duration_since(*last) < self.throttle {
                tracing::trace!(%user_id, "Throttled cursor update");
                return None;
            }
        }
        self.last_sent.insert(user_id.clone(), now);
        Some(cursor)
    }

    /// Store a cursor reported by a remote collaborator, replacing any
    /// earlier one.
    pub fn record_remote_cursor(
        &mut self,
        user_id: UserId,
        username: impl Into<String>,
        cursor: CursorData,
        now: DateTime<Utc>,
    ) {
        let state = CursorState {
            user_id: user_id.clone(),
            username: username.into(),
            position: cursor.position,
            selection_start: cursor.selection_start,
            selection_end: cursor.selection_end,
            last_updated: now,
        };
        self.cursors.insert(user_id, state);
    }

    /// Remove cursors not updated within the TTL. Returns how many were removed.
    pub fn evict_stale(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let before = self.cursors.len();
        self.cursors
            .retain(|_, state| now.signed_duration_since(state.last_updated) <= ttl);
        let evicted = before - self.cursors.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted stale cursors");
        }
        evicted
    }

    /// Forget a collaborator who left, regardless of TTL.
    pub fn on_user_left(&mut self, user_id: &UserId) -> bool {
        self.last_sent.remove(user_id);
        self.cursors.remove(user_id).is_some()
    }

    /// Live cursors, evicting stale ones first.
    pub fn cursors(&mut self, now: DateTime<Utc>) -> impl Iterator<Item = &CursorState> {
        self.evict_stale(now);
        self.cursors.values()
    }

    /// Live cursor of one collaborator.
    pub fn cursor(&mut self, user_id: &UserId, now: DateTime<Utc>) -> Option<&CursorState> {
        self.evict_stale(now);
        self.cursors.get(user_id)
    }

    /// Number of tracked cursors, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    /// Check if no cursors are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Drop all presence state.
    pub fn clear(&mut self) {
        self.cursors.clear();
        self.last_sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_704_067_200_000 + ms).unwrap()
    }

    #[test]
    fn stale_cursors_are_evicted_on_read() {
        let now = at(60_000);
        let mut presence = PresenceTracker::default();
        presence.record_remote_cursor(
            "old".into(),
            "Old",
            CursorData::caret(1),
            now - Duration::seconds(31),
        );
        presence.record_remote_cursor(
            "fresh".into(),
            "Fresh",
            CursorData::caret(2),
            now - Duration::seconds(10),
        );

        let live: Vec<_> = presence.cursors(now).map(|c| c.username.clone()).collect();
        assert_eq!(live, vec!["Fresh".to_string()]);
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn evict_stale_reports_count() {
        let now = at(60_000);
        let mut presence = PresenceTracker::default();
        presence.record_remote_cursor("a".into(), "A", CursorData::caret(0), now - Duration::seconds(45));
        assert_eq!(presence.evict_stale(now), 1);
        assert!(presence.is_empty());
    }

    #[test]
    fn remote_cursor_is_last_write_wins() {
        let mut presence = PresenceTracker::default();
        let user = UserId::new("u1");
        presence.record_remote_cursor(user.clone(), "Ana", CursorData::caret(3), at(0));
        presence.record_remote_cursor(
            user.clone(),
            "Ana",
            CursorData::with_selection(9, 4, 9),
            at(100),
        );

        let state = presence.cursor(&user, at(200)).unwrap();
        assert_eq!(state.cursor(), CursorData::with_selection(9, 4, 9));
        assert!(state.cursor().has_selection());
        assert_eq!(state.last_updated, at(100));
    }

    #[test]
    fn outbound_updates_are_throttled_per_user() {
        let mut presence = PresenceTracker::default();
        let me = UserId::new("me");
        let other = UserId::new("other");

        assert!(presence.update_cursor(&me, CursorData::caret(1), at(0)).is_some());
        assert!(presence.update_cursor(&me, CursorData::caret(2), at(200)).is_none());
        assert!(presence.update_cursor(&other, CursorData::caret(2), at(200)).is_some());
        assert!(presence.update_cursor(&me, CursorData::caret(3), at(499)).is_none());
        assert_eq!(
            presence.update_cursor(&me, CursorData::caret(4), at(500)),
            Some(CursorData::caret(4))
        );
    }

    #[test]
    fn user_left_removes_immediately() {
        let mut presence = PresenceTracker::default();
        let user = UserId::new("u1");
        presence.record_remote_cursor(user.clone(), "Ana", CursorData::caret(0), at(0));
        assert!(presence.on_user_left(&user));
        assert!(!presence.on_user_left(&user));
        assert!(presence.is_empty());
    }

    #[test]
    fn cursor_data_wire_shape() {
        let json = serde_json::to_value(CursorData::with_selection(5, 2, 5)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"position": 5, "selection_start": 2, "selection_end": 5})
        );
    }
}
