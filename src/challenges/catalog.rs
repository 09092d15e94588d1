use crate::challenges::types::{ChallengeManifest, ChallengeMeta};
use crate::error_handling::types::CatalogError;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Capability resolving challenge ids to directories and metadata.
pub trait ChallengeCatalog: Send + Sync {
    /// Absolute directory of the challenge, if known.
    fn dir(&self, challenge_id: i64) -> Option<PathBuf>;

    fn meta(&self, challenge_id: i64) -> Option<ChallengeMeta>;

    fn list(&self) -> Vec<ChallengeMeta>;
}

/// Filesystem-backed catalog.
///
/// Scans `<root>/*/challenge.yaml` once at startup. A challenge
/// directory must carry an executable `validate.sh` to be served;
/// directories with broken manifests are skipped with a warning rather
/// than failing the whole catalog.
pub struct FsChallengeCatalog {
    challenges: HashMap<i64, ChallengeMeta>,
}

impl FsChallengeCatalog {
    pub fn load(root: &Path) -> Result<Self, CatalogError> {
        if !root.is_dir() {
            return Err(CatalogError::NotADirectory(root.to_path_buf()));
        }

        let mut challenges = HashMap::new();
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }

            let manifest_path = dir.join("challenge.yaml");
            if !manifest_path.is_file() {
                debug!("skipping {}: no challenge.yaml", dir.display());
                continue;
            }

            let raw = match std::fs::read_to_string(&manifest_path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping {}: unreadable manifest: {}", dir.display(), e);
                    continue;
                }
            };
            let manifest: ChallengeManifest = match serde_yaml::from_str(&raw) {
                Ok(m) => m,
                Err(e) => {
                    warn!("skipping {}: invalid manifest: {}", dir.display(), e);
                    continue;
                }
            };

            if !dir.join("validate.sh").is_file() {
                warn!(
                    "skipping challenge {} ({}): missing validate.sh",
                    manifest.id,
                    dir.display()
                );
                continue;
            }

            // Containers are only ever given absolute mount sources.
            let dir = dir.canonicalize()?;
            let meta = ChallengeMeta {
                id: manifest.id,
                name: manifest.name,
                points: manifest.points,
                dir,
            };
            if let Some(previous) = challenges.insert(meta.id, meta) {
                warn!(
                    "duplicate challenge id {}: {} shadowed",
                    previous.id,
                    previous.dir.display()
                );
            }
        }

        debug!("challenge catalog loaded with {} entries", challenges.len());
        Ok(Self { challenges })
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

impl ChallengeCatalog for FsChallengeCatalog {
    fn dir(&self, challenge_id: i64) -> Option<PathBuf> {
        self.challenges.get(&challenge_id).map(|c| c.dir.clone())
    }

    fn meta(&self, challenge_id: i64) -> Option<ChallengeMeta> {
        self.challenges.get(&challenge_id).cloned()
    }

    fn list(&self) -> Vec<ChallengeMeta> {
        let mut all: Vec<ChallengeMeta> = self.challenges.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        all
    }
}
