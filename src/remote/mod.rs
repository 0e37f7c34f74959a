pub mod memory;
pub mod supabase;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::profile::model::UserProfile;
use crate::workouts::model::Workout;

/// Errors from the remote side. The repositories branch on
/// `NotAuthenticated` (operate local-only) and downgrade everything else to
/// their observable last-error field.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("network error: {0}")]
    Network(String),
    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to decode remote payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Network(e.to_string())
    }
}

/// The narrow authenticated CRUD surface the repositories depend on. All
/// row-level operations are scoped to the authenticated user by the
/// implementation; upserts are insert-or-replace by id and safe to call with
/// partially-overlapping sets.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn current_user_id(&self) -> Option<Uuid>;

    /// All of the user's workouts, date descending. A row that fails to
    /// decode is skipped, never poisons the batch.
    async fn fetch_workouts(&self) -> Result<Vec<Workout>, RemoteError>;

    async fn upsert_workouts(&self, workouts: &[Workout]) -> Result<(), RemoteError>;

    async fn delete_workout(&self, workout_id: Uuid) -> Result<(), RemoteError>;

    async fn fetch_profile(&self) -> Result<Option<UserProfile>, RemoteError>;

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), RemoteError>;

    /// Uploads a binary object and returns its public URL. Idempotent per
    /// path: re-uploading overwrites.
    async fn upload_binary(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
    ) -> Result<String, RemoteError>;
}
