use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::warn;

use crate::profile::model::UserProfile;
use crate::session::SessionSnapshot;
use crate::workouts::model::Workout;

const WORKOUTS_FILE: &str = "workouts.json";
const PROFILE_FILE: &str = "profile.json";
const SNAPSHOT_FILE: &str = "app_state.json";

/// Durable JSON persistence for the two aggregates plus the resumable-session
/// snapshot, one document per file under the app data directory.
///
/// Reads fail soft: a missing or undecodable file yields the empty value and a
/// warning, never an error. Writes are atomic (temp file + rename) and only
/// fail on disk-level problems.
#[derive(Debug, Clone)]
pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    pub async fn new(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("create data dir {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    async fn read_json<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.file_path(name);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(file = name, error = %e, "failed to read local file");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(file = name, error = %e, "failed to decode local file");
                None
            }
        }
    }

    async fn write_json<T: Serialize>(&self, name: &str, value: &T) -> anyhow::Result<()> {
        let path = self.file_path(name);
        let data = serde_json::to_vec_pretty(value).with_context(|| format!("encode {}", name))?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &data)
            .await
            .with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("commit {}", path.display()))?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> anyhow::Result<()> {
        match fs::remove_file(self.file_path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", name)),
        }
    }

    pub async fn read_workouts(&self) -> Vec<Workout> {
        self.read_json(WORKOUTS_FILE).await.unwrap_or_default()
    }

    pub async fn write_workouts(&self, workouts: &[Workout]) -> anyhow::Result<()> {
        self.write_json(WORKOUTS_FILE, &workouts).await
    }

    pub async fn read_profile(&self) -> Option<UserProfile> {
        self.read_json(PROFILE_FILE).await
    }

    pub async fn write_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        self.write_json(PROFILE_FILE, profile).await
    }

    pub async fn read_snapshot(&self) -> Option<SessionSnapshot> {
        self.read_json(SNAPSHOT_FILE).await
    }

    pub async fn write_snapshot(&self, snapshot: &SessionSnapshot) -> anyhow::Result<()> {
        self.write_json(SNAPSHOT_FILE, snapshot).await
    }

    pub async fn clear_snapshot(&self) -> anyhow::Result<()> {
        self.remove(SNAPSHOT_FILE).await
    }

    pub async fn delete_workouts(&self) -> anyhow::Result<()> {
        self.remove(WORKOUTS_FILE).await
    }

    pub async fn delete_profile(&self) -> anyhow::Result<()> {
        self.remove(PROFILE_FILE).await
    }

    /// Removes every persisted file. Used on logout/reset.
    pub async fn delete_all(&self) -> anyhow::Result<()> {
        for name in [WORKOUTS_FILE, PROFILE_FILE, SNAPSHOT_FILE] {
            self.remove(name).await?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
