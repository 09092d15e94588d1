//! Validation use case: couples the container exit code to durable
//! progress records and tears the session down on success.

use crate::challenges::ChallengeCatalog;
use crate::container_management::ContainerManager;
use crate::error_handling::types::ValidationError;
use crate::progress::ProgressStore;
use crate::session_management::{SessionManager, SessionStatus};
use log::{error, info};
use std::sync::Arc;
use uuid::Uuid;

/// Outcome returned to the HTTP layer.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub success: bool,
    /// Points awarded; `Some(0)` for a repeat solve, `None` on failure.
    pub points: Option<i64>,
    pub message: String,
}

pub struct ValidationCoordinator {
    sessions: Arc<SessionManager>,
    containers: Arc<ContainerManager>,
    progress: Arc<dyn ProgressStore>,
    catalog: Arc<dyn ChallengeCatalog>,
}

impl ValidationCoordinator {
    pub fn new(
        sessions: Arc<SessionManager>,
        containers: Arc<ContainerManager>,
        progress: Arc<dyn ProgressStore>,
        catalog: Arc<dyn ChallengeCatalog>,
    ) -> Self {
        Self {
            sessions,
            containers,
            progress,
            catalog,
        }
    }

    /// Runs the challenge's validation script for the caller's session.
    ///
    /// The attempt is recorded whether or not the script passes; the
    /// solve row is inserted at most once per (user, challenge). On
    /// success the container is removed best-effort (the cleanup loop
    /// reclaims it otherwise) and the session ends.
    pub async fn validate(
        &self,
        user_id: i64,
        session_id: Uuid,
    ) -> Result<ValidationOutcome, ValidationError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or(ValidationError::NotFound)?;
        if session.user_id != user_id {
            return Err(ValidationError::Forbidden);
        }
        if session.status != SessionStatus::Active {
            return Err(ValidationError::NotActive);
        }

        let already_solved = self
            .progress
            .has_solved(user_id, session.challenge_id)
            .await
            .map_err(ValidationError::Progress)?;

        let success = self
            .containers
            .validate(&session.container_id, session.challenge_id)
            .await;

        self.progress
            .record_validation(user_id, session.challenge_id, success)
            .await
            .map_err(ValidationError::Progress)?;

        if success {
            let points = if already_solved {
                0
            } else {
                self.catalog
                    .meta(session.challenge_id)
                    .map(|m| m.points)
                    .unwrap_or(0)
            };

            if let Err(e) = self.containers.remove(&session.container_id).await {
                error!(
                    "failed to remove container {} after solve, leaving it to the cleanup loop: {}",
                    session.container_id, e
                );
            }
            self.sessions.end(session.id);

            info!(
                "user {} solved challenge {} ({} points)",
                user_id, session.challenge_id, points
            );
            Ok(ValidationOutcome {
                success: true,
                points: Some(points),
                message: "Congratulations! Challenge solved!".to_string(),
            })
        } else {
            Ok(ValidationOutcome {
                success: false,
                points: None,
                message: "Validation failed. Keep trying!".to_string(),
            })
        }
    }
}
