//! Challenge catalog subsystem.
//!
//! Maps challenge identifiers to on-disk challenge directories. The
//! container manager only needs the directory (mounted read-only into
//! the container); the HTTP layer additionally reads point values.

pub mod catalog;
pub mod types;

pub use catalog::{ChallengeCatalog, FsChallengeCatalog};
pub use types::ChallengeMeta;
