//! Error types for every subsystem.
//!
//! Each subsystem gets a small enum; the HTTP layer is the only place
//! where error kinds are translated into status codes.

use std::path::PathBuf;

/// Errors reported by the container engine driver.
///
/// The driver performs no retries and no classification beyond this
/// taxonomy; policy lives in the layers above it.
#[derive(Debug)]
pub enum DriverError {
    /// The engine answered 404 for the addressed object.
    NotFound,
    /// The engine answered 409 (name or object already present).
    AlreadyExists,
    /// The engine reported a failing build step.
    Build(String),
    /// Any other engine or transport failure.
    Engine(String),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::NotFound => write!(f, "object not found by engine"),
            DriverError::AlreadyExists => write!(f, "object already exists"),
            DriverError::Build(msg) => write!(f, "image build failed: {}", msg),
            DriverError::Engine(msg) => write!(f, "engine error: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

/// Errors surfaced by the container manager.
#[derive(Debug)]
pub enum ContainerError {
    ImageBuildFailed(String),
    ChallengeNotFound(i64),
    CreationFailed(String),
    StartFailed(String),
    AttachFailed(String),
    RemoveFailed(String),
}

impl std::fmt::Display for ContainerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerError::ImageBuildFailed(msg) => write!(f, "base image build failed: {}", msg),
            ContainerError::ChallengeNotFound(id) => write!(f, "challenge {} not found", id),
            ContainerError::CreationFailed(msg) => write!(f, "container creation failed: {}", msg),
            ContainerError::StartFailed(msg) => write!(f, "container start failed: {}", msg),
            ContainerError::AttachFailed(msg) => write!(f, "PTY attach failed: {}", msg),
            ContainerError::RemoveFailed(msg) => write!(f, "container removal failed: {}", msg),
        }
    }
}

impl std::error::Error for ContainerError {}

/// Errors surfaced by the session manager.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    /// Per-user or global cap reached; carries the reason shown to the user.
    AdmissionDenied(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::AdmissionDenied(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for SessionError {}

/// Token verification failures.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing authentication token"),
            AuthError::InvalidToken => write!(f, "invalid authentication token"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Errors from the progress store.
#[derive(Debug)]
pub enum ProgressError {
    ConnectionFailed(String),
    QueryFailed(String),
}

impl std::fmt::Display for ProgressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressError::ConnectionFailed(msg) => write!(f, "database connection failed: {}", msg),
            ProgressError::QueryFailed(msg) => write!(f, "database query failed: {}", msg),
        }
    }
}

impl std::error::Error for ProgressError {}

/// Errors from the validation use case.
#[derive(Debug)]
pub enum ValidationError {
    NotFound,
    Forbidden,
    NotActive,
    Progress(ProgressError),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::NotFound => write!(f, "session not found"),
            ValidationError::Forbidden => write!(f, "session belongs to another user"),
            ValidationError::NotActive => write!(f, "session is not active"),
            ValidationError::Progress(e) => write!(f, "progress store failure: {}", e),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors while loading the challenge catalog.
#[derive(Debug)]
pub enum CatalogError {
    NotADirectory(PathBuf),
    Io(std::io::Error),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NotADirectory(path) => {
                write!(f, "challenge root {} is not a directory", path.display())
            }
            CatalogError::Io(e) => write!(f, "challenge catalog I/O error: {}", e),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Io(err)
    }
}

/// Errors from the web server.
#[derive(Debug)]
pub enum WebError {
    InvalidBindAddress(String),
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebError::InvalidBindAddress(addr) => write!(f, "invalid bind address: {}", addr),
        }
    }
}

impl std::error::Error for WebError {}

/// Errors during controller startup or shutdown.
#[derive(Debug)]
pub enum ControllerError {
    Driver(DriverError),
    Catalog(CatalogError),
    Progress(ProgressError),
}

impl std::fmt::Display for ControllerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerError::Driver(e) => write!(f, "container engine unavailable: {}", e),
            ControllerError::Catalog(e) => write!(f, "challenge catalog failed to load: {}", e),
            ControllerError::Progress(e) => write!(f, "progress store failed to open: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}
