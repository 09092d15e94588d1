pub mod auth;
pub use auth::TokenVerifier;

pub mod challenges;
pub use challenges::{ChallengeCatalog, FsChallengeCatalog};

pub mod cleanup;
pub use cleanup::CleanupLoop;

pub mod configuration;
pub use configuration::Configuration;

pub mod container_management;
pub use container_management::{ContainerDriver, ContainerManager, DockerDriver};

pub mod controller;
pub use controller::Controller;

pub mod error_handling;

pub mod progress;
pub use progress::{DatabaseProgress, ProgressStore};

pub mod session_management;
pub use session_management::{Session, SessionManager, SessionStatus};

pub mod terminal_gateway;
pub use terminal_gateway::TerminalGateway;

pub mod validation;
pub use validation::ValidationCoordinator;

pub mod web_interface;
pub use web_interface::WebServer;
