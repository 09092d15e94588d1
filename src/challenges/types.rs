use serde::Deserialize;
use std::path::PathBuf;

/// A loaded challenge: manifest fields plus the resolved directory.
#[derive(Debug, Clone)]
pub struct ChallengeMeta {
    pub id: i64,
    pub name: String,
    pub points: i64,
    /// Absolute path of the challenge directory.
    pub dir: PathBuf,
}

/// On-disk shape of `challenge.yaml`.
#[derive(Debug, Deserialize)]
pub struct ChallengeManifest {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_points")]
    pub points: i64,
    #[serde(default)]
    pub description: String,
}

fn default_points() -> i64 {
    100
}
