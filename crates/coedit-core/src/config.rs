//! Engine tuning knobs.

use crate::operation::ClampPolicy;
use chrono::Duration;

/// Configuration shared by the sequencer, presence tracker, and session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Remote cursors older than this are evicted on read
    pub presence_ttl: Duration,

    /// Minimum spacing between outbound cursor updates per user
    pub cursor_throttle: Duration,

    /// How overlong removals are handled when applying remote operations
    pub clamp_policy: ClampPolicy,

    /// Upper bound on local operations awaiting acknowledgement
    pub max_unacknowledged: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            presence_ttl: Duration::seconds(30),
            cursor_throttle: Duration::milliseconds(500),
            clamp_policy: ClampPolicy::Clamp,
            max_unacknowledged: 256,
        }
    }
}
