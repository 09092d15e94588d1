use std::time::Duration;

/// Session admission and timeout budgets.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Maximum concurrently active sessions per user.
    pub max_per_user: usize,
    /// Maximum concurrently active sessions across all users.
    pub max_total: usize,
    /// A session with no relayed activity for this long is expired.
    pub idle_timeout: Duration,
    /// A session older than this is expired regardless of activity.
    pub max_duration: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_per_user: 1,
            max_total: 15,
            idle_timeout: Duration::from_secs(600),
            max_duration: Duration::from_secs(900),
        }
    }
}

/// Resource and image profile for challenge containers.
#[derive(Debug, Clone)]
pub struct ContainerSettings {
    /// Tag of the base image to ensure/build.
    pub image_name: String,
    pub memory_bytes: i64,
    pub cpu_nanocores: i64,
    pub pids_limit: i64,
    /// Network mode handed to the engine; "none" in the default profile.
    pub network_mode: String,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            image_name: "shellquest-base:latest".to_string(),
            memory_bytes: 512 * 1024 * 1024,
            cpu_nanocores: 500_000_000,
            pids_limit: 100,
            network_mode: "none".to_string(),
        }
    }
}
