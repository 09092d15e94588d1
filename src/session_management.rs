pub mod session;
pub mod session_manager;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Ended,
}

pub use session::Session;
pub use session_manager::{AdmissionDecision, SessionManager};
