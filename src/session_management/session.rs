use crate::session_management::SessionStatus;
use chrono::{DateTime, Utc};
use std::time::Instant;
use uuid::Uuid;

/// A user's live shell bound to one challenge container.
///
/// Timeout arithmetic uses the monotonic `Instant` fields; the
/// wall-clock fields exist only for display and serialization.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique identifier, generated at creation.
    pub id: Uuid,
    pub user_id: i64,
    pub challenge_id: i64,
    /// Engine handle of the running container.
    pub container_id: String,
    pub status: SessionStatus,
    /// Monotonic creation instant, basis of the absolute timeout.
    pub created_at: Instant,
    /// Monotonic instant of the last relayed terminal activity.
    pub last_activity_at: Instant,
    /// Wall-clock creation time.
    pub started_at: DateTime<Utc>,
    /// Wall-clock moment the absolute timeout elapses.
    pub expires_at: DateTime<Utc>,
}
