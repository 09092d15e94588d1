use crate::configuration::types::SessionSettings;
use crate::error_handling::types::SessionError;
use crate::session_management::session::Session;
use crate::session_management::SessionStatus;
use chrono::Utc;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Result of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl AdmissionDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

struct Registry {
    sessions: HashMap<Uuid, Session>,
    /// (user, challenge) pairs whose container creation is in flight.
    pending: HashSet<(i64, i64)>,
}

/// In-memory registry of active sessions with admission control.
///
/// All state lives behind one mutex; every method bounds its hold time
/// and performs no I/O under the lock. Container operations always
/// happen outside, between `mark_pending` and `create`.
pub struct SessionManager {
    inner: Mutex<Registry>,
    settings: SessionSettings,
    /// Terminal transitions queue the session id here so the terminal
    /// gateway can close the matching socket without blocking.
    close_tx: mpsc::UnboundedSender<Uuid>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, close_tx: mpsc::UnboundedSender<Uuid>) -> Self {
        Self {
            inner: Mutex::new(Registry {
                sessions: HashMap::new(),
                pending: HashSet::new(),
            }),
            settings,
            close_tx,
        }
    }

    /// Checks the per-user and global caps against live active counts.
    pub fn admit(&self, user_id: i64) -> AdmissionDecision {
        let inner = self.inner.lock().unwrap();

        let user_active = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .count();
        if user_active >= self.settings.max_per_user {
            return AdmissionDecision::denied(format!(
                "Maximum {} active session(s) per user",
                self.settings.max_per_user
            ));
        }

        let total_active = inner
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .count();
        if total_active >= self.settings.max_total {
            return AdmissionDecision::denied("System at capacity".to_string());
        }

        AdmissionDecision::allowed()
    }

    /// Claims the pending marker for `(user, challenge)`. Returns false
    /// when another request already holds it.
    pub fn mark_pending(&self, user_id: i64, challenge_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .pending
            .insert((user_id, challenge_id))
    }

    pub fn clear_pending(&self, user_id: i64, challenge_id: i64) {
        self.inner
            .lock()
            .unwrap()
            .pending
            .remove(&(user_id, challenge_id));
    }

    pub fn is_pending(&self, user_id: i64, challenge_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .pending
            .contains(&(user_id, challenge_id))
    }

    /// Inserts a fresh session for an already-created container.
    ///
    /// Both caps are re-verified under the lock: the pending marker is
    /// keyed by (user, challenge), so two racing starts for different
    /// challenges could otherwise both slip past `admit`.
    pub fn create(
        &self,
        user_id: i64,
        challenge_id: i64,
        container_id: String,
    ) -> Result<Session, SessionError> {
        let mut inner = self.inner.lock().unwrap();

        let user_active = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .count();
        if user_active >= self.settings.max_per_user {
            return Err(SessionError::AdmissionDenied(format!(
                "Maximum {} active session(s) per user",
                self.settings.max_per_user
            )));
        }
        let total_active = inner
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .count();
        if total_active >= self.settings.max_total {
            return Err(SessionError::AdmissionDenied(
                "System at capacity".to_string(),
            ));
        }

        let now = Instant::now();
        let wall = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            challenge_id,
            container_id,
            status: SessionStatus::Active,
            created_at: now,
            last_activity_at: now,
            started_at: wall,
            expires_at: wall + chrono::Duration::seconds(self.settings.max_duration.as_secs() as i64),
        };
        inner.sessions.insert(session.id, session.clone());
        info!(
            "session {} created for user {} challenge {} (container {})",
            session.id, user_id, challenge_id, session.container_id
        );
        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.lock().unwrap().sessions.get(&id).cloned()
    }

    /// The caller's active session for a challenge, if any.
    pub fn find_for(&self, user_id: i64, challenge_id: i64) -> Option<Session> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .find(|s| {
                s.user_id == user_id
                    && s.challenge_id == challenge_id
                    && s.status == SessionStatus::Active
            })
            .cloned()
    }

    /// Advances the activity stamp. No-op for unknown sessions; a stale
    /// caller can never move the stamp backwards.
    pub fn update_activity(&self, id: Uuid) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.get_mut(&id) {
            let now = Instant::now();
            if now > session.last_activity_at {
                session.last_activity_at = now;
            }
        }
    }

    /// Ends a session normally. Idempotent.
    pub fn end(&self, id: Uuid) {
        self.finish(id, SessionStatus::Ended);
    }

    /// Ends a session because a timeout elapsed. Idempotent.
    pub fn mark_expired(&self, id: Uuid) {
        self.finish(id, SessionStatus::Expired);
    }

    fn finish(&self, id: Uuid, status: SessionStatus) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            inner.sessions.remove(&id).map(|mut session| {
                session.status = status;
                session
            })
        };

        if let Some(session) = removed {
            info!(
                "session {} for user {} is now {:?}",
                session.id, session.user_id, status
            );
            // Non-blocking close request; the gateway side is idempotent.
            let _ = self.close_tx.send(id);
        } else {
            debug!("finish({:?}) for unknown session {}", status, id);
        }
    }

    pub fn list_active(&self) -> Vec<Session> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .cloned()
            .collect()
    }

    pub fn list_user(&self, user_id: i64) -> Vec<Session> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.status == SessionStatus::Active)
            .cloned()
            .collect()
    }

    /// Sessions whose idle or absolute timeout has elapsed right now.
    pub fn list_expired(&self) -> Vec<Session> {
        let idle = self.settings.idle_timeout;
        let max = self.settings.max_duration;
        self.inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.last_activity_at.elapsed() > idle || s.created_at.elapsed() > max)
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .count()
    }
}
