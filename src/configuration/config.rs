use super::types::{ContainerSettings, SessionSettings};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration covering all runtime parameters.
///
/// Every field is exposed both as a command-line flag and as an
/// environment variable so the binary works unchanged under a process
/// supervisor or a container orchestrator.
///
/// # Fields Overview
///
/// - `bind_address` / `http_port`: where the HTTP + WebSocket surface listens
/// - `challenges_root`: directory scanned for challenge definitions
/// - `database_path`: SQLite file holding attempt and solve records
/// - `jwt_secret`: HS256 secret used to verify session tokens
/// - `container_*`: resource profile applied to every challenge container
/// - `max_sessions_per_user` / `max_total_sessions`: admission caps
/// - `idle_timeout_secs` / `max_session_secs`: session time budgets
/// - `cleanup_interval_secs`: period of the expiry sweeper
/// - `shutdown_drain_ms`: how long shutdown waits for terminal streams to
///   drain before containers are force-removed
#[derive(Parser, Debug, Clone)]
pub struct Configuration {
    /// Network address the server binds to.
    #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// TCP port for the HTTP API and the terminal WebSocket.
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    pub http_port: u16,

    /// Directory containing one subdirectory per challenge.
    ///
    /// Each subdirectory must hold a `challenge.yaml` and an executable
    /// `validate.sh`; `setup.sh` is optional.
    #[arg(long, env = "CHALLENGES_ROOT")]
    pub challenges_root: PathBuf,

    /// Path of the SQLite database storing attempts and solves.
    #[arg(long, env = "DATABASE_PATH", default_value = "shellquest.sqlite3")]
    pub database_path: PathBuf,

    /// Shared secret used to verify HS256 session tokens.
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: String,

    /// Tag of the base container image; built from the embedded
    /// Dockerfile when missing.
    #[arg(long, env = "CONTAINER_IMAGE", default_value = "shellquest-base:latest")]
    pub container_image: String,

    /// Memory limit per challenge container, in bytes.
    #[arg(long, env = "CONTAINER_MEMORY_BYTES", default_value_t = 512 * 1024 * 1024)]
    pub container_memory_bytes: i64,

    /// CPU quota per challenge container, in nanocores.
    #[arg(long, env = "CONTAINER_CPU_NANOCORES", default_value_t = 500_000_000)]
    pub container_cpu_nanocores: i64,

    /// PID limit per challenge container.
    #[arg(long, env = "CONTAINER_PIDS_LIMIT", default_value_t = 100)]
    pub container_pids_limit: i64,

    /// Network mode for challenge containers.
    #[arg(long, env = "CONTAINER_NETWORK_MODE", default_value = "none")]
    pub container_network_mode: String,

    /// Maximum concurrently active sessions per user.
    #[arg(long, env = "MAX_SESSIONS_PER_USER", default_value_t = 1)]
    pub max_sessions_per_user: usize,

    /// Maximum concurrently active sessions across all users.
    #[arg(long, env = "MAX_TOTAL_SESSIONS", default_value_t = 15)]
    pub max_total_sessions: usize,

    /// Seconds of inactivity after which a session expires.
    #[arg(long, env = "IDLE_TIMEOUT_SECS", default_value_t = 600)]
    pub idle_timeout_secs: u64,

    /// Absolute session lifetime in seconds.
    #[arg(long, env = "MAX_SESSION_SECS", default_value_t = 900)]
    pub max_session_secs: u64,

    /// Seconds between expiry sweeps.
    #[arg(long, env = "CLEANUP_INTERVAL_SECS", default_value_t = 300)]
    pub cleanup_interval_secs: u64,

    /// Milliseconds shutdown waits for terminal streams to drain before
    /// force-removing containers.
    #[arg(long, env = "SHUTDOWN_DRAIN_MS", default_value_t = 1000)]
    pub shutdown_drain_ms: u64,
}

impl Configuration {
    /// Parses the configuration from command-line arguments and the
    /// environment.
    pub fn from_args() -> Self {
        Configuration::parse()
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            max_per_user: self.max_sessions_per_user,
            max_total: self.max_total_sessions,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            max_duration: Duration::from_secs(self.max_session_secs),
        }
    }

    pub fn container_settings(&self) -> ContainerSettings {
        ContainerSettings {
            image_name: self.container_image.clone(),
            memory_bytes: self.container_memory_bytes,
            cpu_nanocores: self.container_cpu_nanocores,
            pids_limit: self.container_pids_limit,
            network_mode: self.container_network_mode.clone(),
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::parse_from([
            "shellquest",
            "--jwt-secret",
            "insecure-default-secret",
            "--challenges-root",
            "challenges",
        ])
    }
}
