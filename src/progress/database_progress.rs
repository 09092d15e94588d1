use std::path::Path;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, Statement, TransactionTrait,
};

use crate::error_handling::types::ProgressError;
use crate::progress::db_entities as attempts;
use crate::progress::db_entities::solves;
use crate::progress::progress_store::{AttemptRecord, ProgressStore};
use async_trait::async_trait;

/// SQLite-backed [`ProgressStore`].
pub struct DatabaseProgress {
    conn: DatabaseConnection,
}

impl DatabaseProgress {
    /// Opens (creating if needed) the database file and its schema.
    pub async fn connect_file<P: AsRef<Path>>(path: P) -> Result<Self, ProgressError> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ProgressError::ConnectionFailed(e.to_string()))?;
            }
        }
        // DSN understood by the sqlx driver; creates the file if needed.
        let dsn = format!("sqlite://{}?mode=rwc", path_ref.to_string_lossy());
        Self::connect(&dsn).await
    }

    pub async fn connect(dsn: &str) -> Result<Self, ProgressError> {
        let conn = Database::connect(dsn)
            .await
            .map_err(|e| ProgressError::ConnectionFailed(e.to_string()))?;

        conn.execute(Statement::from_string(
            DbBackend::Sqlite,
            "PRAGMA foreign_keys = ON".to_string(),
        ))
        .await
        .map_err(|e| ProgressError::ConnectionFailed(e.to_string()))?;

        conn.execute(Statement::from_string(
            DbBackend::Sqlite,
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                challenge_id INTEGER NOT NULL,
                success INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
        "#
            .to_string(),
        ))
        .await
        .map_err(|e| ProgressError::ConnectionFailed(e.to_string()))?;

        conn.execute(Statement::from_string(
            DbBackend::Sqlite,
            r#"
            CREATE TABLE IF NOT EXISTS solves (
                user_id INTEGER NOT NULL,
                challenge_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (user_id, challenge_id)
            );
        "#
            .to_string(),
        ))
        .await
        .map_err(|e| ProgressError::ConnectionFailed(e.to_string()))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl ProgressStore for DatabaseProgress {
    async fn has_solved(&self, user_id: i64, challenge_id: i64) -> Result<bool, ProgressError> {
        let found = solves::Entity::find()
            .filter(solves::Column::UserId.eq(user_id))
            .filter(solves::Column::ChallengeId.eq(challenge_id))
            .one(&self.conn)
            .await
            .map_err(|e| ProgressError::QueryFailed(e.to_string()))?;
        Ok(found.is_some())
    }

    async fn record_validation(
        &self,
        user_id: i64,
        challenge_id: i64,
        success: bool,
    ) -> Result<(), ProgressError> {
        let stamp = Utc::now().to_rfc3339();
        self.conn
            .transaction::<_, (), DbErr>(move |txn| {
                Box::pin(async move {
                    let attempt = attempts::ActiveModel {
                        user_id: Set(user_id),
                        challenge_id: Set(challenge_id),
                        success: Set(success),
                        created_at: Set(stamp.clone()),
                        ..Default::default()
                    };
                    // exec avoids fetching the inserted row (SQLite
                    // RETURNING may be unavailable).
                    attempts::Entity::insert(attempt).exec(txn).await?;

                    if success {
                        let solve = solves::ActiveModel {
                            user_id: Set(user_id),
                            challenge_id: Set(challenge_id),
                            created_at: Set(stamp),
                        };
                        let inserted = solves::Entity::insert(solve)
                            .on_conflict(
                                OnConflict::columns([
                                    solves::Column::UserId,
                                    solves::Column::ChallengeId,
                                ])
                                .do_nothing()
                                .to_owned(),
                            )
                            .exec(txn)
                            .await;
                        match inserted {
                            Ok(_) => {}
                            // Conflict skipped: the solve already exists.
                            Err(DbErr::RecordNotInserted) => {}
                            Err(e) => return Err(e),
                        }
                    }
                    Ok(())
                })
            })
            .await
            .map_err(|e| ProgressError::QueryFailed(e.to_string()))
    }

    async fn attempts_for(
        &self,
        user_id: i64,
        challenge_id: i64,
    ) -> Result<Vec<AttemptRecord>, ProgressError> {
        let rows = attempts::Entity::find()
            .filter(attempts::Column::UserId.eq(user_id))
            .filter(attempts::Column::ChallengeId.eq(challenge_id))
            .order_by_asc(attempts::Column::Id)
            .all(&self.conn)
            .await
            .map_err(|e| ProgressError::QueryFailed(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|m| AttemptRecord {
                user_id: m.user_id,
                challenge_id: m.challenge_id,
                success: m.success,
                created_at: m.created_at,
            })
            .collect())
    }

    async fn solve_count(&self, user_id: i64) -> Result<u64, ProgressError> {
        let rows = solves::Entity::find()
            .filter(solves::Column::UserId.eq(user_id))
            .all(&self.conn)
            .await
            .map_err(|e| ProgressError::QueryFailed(e.to_string()))?;
        Ok(rows.len() as u64)
    }
}
