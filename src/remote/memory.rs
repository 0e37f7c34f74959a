use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{RemoteError, RemoteGateway};
use crate::profile::model::UserProfile;
use crate::workouts::model::Workout;

#[derive(Default)]
struct Inner {
    user_id: Option<Uuid>,
    workouts: Vec<Workout>,
    profile: Option<UserProfile>,
    uploads: HashMap<String, Bytes>,
    fail_requests: bool,
    fail_fetches: bool,
    upsert_workout_calls: usize,
    upsert_profile_calls: usize,
    deleted_workout_ids: Vec<Uuid>,
}

/// In-memory gateway. Backs tests and the local-only wiring when no remote
/// backend is configured (every call then fails with `NotAuthenticated`,
/// which the repositories treat as "operate local-only").
#[derive(Default)]
pub struct MemoryGateway {
    inner: RwLock<Inner>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticated(user_id: Uuid) -> Self {
        let gateway = Self::new();
        gateway.sign_in(user_id);
        gateway
    }

    pub fn sign_in(&self, user_id: Uuid) {
        self.write().user_id = Some(user_id);
    }

    pub fn sign_out(&self) {
        self.write().user_id = None;
    }

    /// Makes every subsequent remote call fail with a network error.
    pub fn set_failing(&self, failing: bool) {
        self.write().fail_requests = failing;
    }

    /// Makes only fetches fail, leaving writes working. Exercises the
    /// fall-back-then-push reconcile path.
    pub fn set_failing_fetches(&self, failing: bool) {
        self.write().fail_fetches = failing;
    }

    pub fn remote_workouts(&self) -> Vec<Workout> {
        self.read().workouts.clone()
    }

    /// Seeds a row directly, bypassing the upsert timestamping. Lets tests
    /// control `created_at` for cleanup-ordering assertions.
    pub fn seed_workout(&self, workout: Workout) {
        self.write().workouts.push(workout);
    }

    pub fn seed_profile(&self, profile: UserProfile) {
        self.write().profile = Some(profile);
    }

    pub fn remote_profile(&self) -> Option<UserProfile> {
        self.read().profile.clone()
    }

    pub fn uploaded(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.read().uploads.get(&object_key(bucket, path)).cloned()
    }

    pub fn upsert_workout_calls(&self) -> usize {
        self.read().upsert_workout_calls
    }

    pub fn upsert_profile_calls(&self) -> usize {
        self.read().upsert_profile_calls
    }

    pub fn deleted_workout_ids(&self) -> Vec<Uuid> {
        self.read().deleted_workout_ids.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("gateway state poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("gateway state poisoned")
    }

    fn check(inner: &Inner) -> Result<Uuid, RemoteError> {
        let user_id = inner.user_id.ok_or(RemoteError::NotAuthenticated)?;
        if inner.fail_requests {
            return Err(RemoteError::Network("injected failure".into()));
        }
        Ok(user_id)
    }

    fn check_fetch(inner: &Inner) -> Result<Uuid, RemoteError> {
        let user_id = Self::check(inner)?;
        if inner.fail_fetches {
            return Err(RemoteError::Network("injected fetch failure".into()));
        }
        Ok(user_id)
    }
}

fn object_key(bucket: &str, path: &str) -> String {
    format!("{bucket}/{path}")
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    fn is_authenticated(&self) -> bool {
        self.read().user_id.is_some()
    }

    fn current_user_id(&self) -> Option<Uuid> {
        self.read().user_id
    }

    async fn fetch_workouts(&self) -> Result<Vec<Workout>, RemoteError> {
        let inner = self.read();
        Self::check_fetch(&inner)?;
        let mut workouts = inner.workouts.clone();
        workouts.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(workouts)
    }

    async fn upsert_workouts(&self, workouts: &[Workout]) -> Result<(), RemoteError> {
        let mut inner = self.write();
        Self::check(&inner)?;
        inner.upsert_workout_calls += 1;
        for workout in workouts {
            let mut row = workout.clone();
            row.updated_at = Some(OffsetDateTime::now_utc());
            if let Some(existing) = inner.workouts.iter_mut().find(|w| w.id == workout.id) {
                row.created_at = existing.created_at.or(row.created_at);
                *existing = row;
            } else {
                row.created_at = row.created_at.or(Some(OffsetDateTime::now_utc()));
                inner.workouts.push(row);
            }
        }
        Ok(())
    }

    async fn delete_workout(&self, workout_id: Uuid) -> Result<(), RemoteError> {
        let mut inner = self.write();
        Self::check(&inner)?;
        inner.workouts.retain(|w| w.id != workout_id);
        inner.deleted_workout_ids.push(workout_id);
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<Option<UserProfile>, RemoteError> {
        let inner = self.read();
        Self::check_fetch(&inner)?;
        Ok(inner.profile.clone())
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), RemoteError> {
        let mut inner = self.write();
        Self::check(&inner)?;
        inner.upsert_profile_calls += 1;
        inner.profile = Some(profile.clone());
        Ok(())
    }

    async fn upload_binary(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
    ) -> Result<String, RemoteError> {
        let mut inner = self.write();
        Self::check(&inner)?;
        let key = object_key(bucket, path);
        inner.uploads.insert(key.clone(), bytes);
        Ok(format!("memory://{key}"))
    }
}
