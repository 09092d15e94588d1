//! Progress persistence.
//!
//! Components:
//! - `progress_store`: the ProgressStore trait defining the capability
//!   the validation path depends on.
//! - `database_progress`: ORM-based SQLite implementation using SeaORM.
//! - `db_entities`: SeaORM entity models.

pub mod database_progress;
pub mod db_entities;
pub mod progress_store;

pub use database_progress::DatabaseProgress;
pub use progress_store::{AttemptRecord, ProgressStore};
