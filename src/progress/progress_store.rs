//! ProgressStore trait
//!
//! The capability the validation path depends on: it records attempts
//! and first solves and answers whether a user has already solved a
//! challenge. All methods return a `Result` to surface storage errors.

use crate::error_handling::types::ProgressError;
use async_trait::async_trait;

/// One recorded validation attempt.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub user_id: i64,
    pub challenge_id: i64,
    pub success: bool,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Whether a solve row exists for `(user, challenge)`.
    async fn has_solved(&self, user_id: i64, challenge_id: i64) -> Result<bool, ProgressError>;

    /// Records the outcome of one validation run in a single
    /// transaction: the attempt row is always appended, and on success
    /// the solve row is inserted-or-ignored. The attempt insert
    /// happens-before the solve insert.
    async fn record_validation(
        &self,
        user_id: i64,
        challenge_id: i64,
        success: bool,
    ) -> Result<(), ProgressError>;

    /// All attempts of a user on a challenge, oldest first.
    async fn attempts_for(
        &self,
        user_id: i64,
        challenge_id: i64,
    ) -> Result<Vec<AttemptRecord>, ProgressError>;

    /// Number of distinct challenges the user has solved.
    async fn solve_count(&self, user_id: i64) -> Result<u64, ProgressError>;
}
