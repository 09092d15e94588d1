//! Core types used by the container management subsystem.

use crate::error_handling::types::DriverError;
use futures_util::Stream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::AsyncWrite;

/// A host directory mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Absolute path on the host.
    pub source: PathBuf,
    /// Path inside the container.
    pub target: String,
    pub read_only: bool,
}

/// Everything the engine needs to create a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    /// Allocate a TTY and keep stdin open.
    pub tty: bool,
    pub mounts: Vec<BindMount>,
    pub memory_bytes: i64,
    pub cpu_nanocores: i64,
    pub pids_limit: i64,
    pub network_mode: String,
    pub labels: HashMap<String, String>,
}

/// Parameters for creating an exec inside a running container.
#[derive(Debug, Clone)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    pub tty: bool,
}

/// Result of inspecting an exec.
///
/// The exit code is undefined while the exec's output stream has not
/// been consumed to end-of-stream.
#[derive(Debug, Clone, Copy)]
pub struct ExecStatus {
    pub exit_code: Option<i64>,
    pub running: bool,
}

/// Duplex byte channel of a started, attached exec.
pub struct ExecStream {
    /// Bytes produced by the exec, raw when the exec has a TTY.
    pub output: Pin<Box<dyn Stream<Item = Result<Vec<u8>, DriverError>> + Send>>,
    /// Stdin of the exec.
    pub input: Pin<Box<dyn AsyncWrite + Send>>,
}
