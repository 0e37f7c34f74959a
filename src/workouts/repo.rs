use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use time::{Date, OffsetDateTime};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::remote::{RemoteError, RemoteGateway};
use crate::storage::LocalStore;
use crate::workouts::model::Workout;

/// Successful reconciliations within this window are skipped unless forced.
const RECONCILE_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Default)]
struct State {
    workouts: Vec<Workout>,
    active: Option<Workout>,
    last_error: Option<String>,
}

/// Owner of the workout collection and the active session. Loads local data
/// first for instant availability, reconciles with the remote store in the
/// background, and fans every mutation out to the local file (always) and the
/// remote store (best-effort, authenticated only).
pub struct WorkoutRepository {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteGateway>,
    photos_bucket: String,
    state: Arc<RwLock<State>>,
    last_reconcile: std::sync::Mutex<Option<Instant>>,
    cleanup_started: AtomicBool,
    background: Mutex<JoinSet<()>>,
}

impl WorkoutRepository {
    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteGateway>,
        photos_bucket: impl Into<String>,
    ) -> Self {
        Self {
            local,
            remote,
            photos_bucket: photos_bucket.into(),
            state: Arc::new(RwLock::new(State::default())),
            last_reconcile: std::sync::Mutex::new(None),
            cleanup_started: AtomicBool::new(false),
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub async fn workouts(&self) -> Vec<Workout> {
        self.state.read().await.workouts.clone()
    }

    pub async fn active_workout(&self) -> Option<Workout> {
        self.state.read().await.active.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Populates the in-memory collection from the local file. Never touches
    /// the active session and never fails (reads are soft).
    pub async fn load_local_first(&self) {
        let workouts = self.local.read_workouts().await;
        debug!(count = workouts.len(), "loaded workouts from local store");
        self.state.write().await.workouts = workouts;
    }

    /// Reconciles the local and remote copies of the collection. No-op when a
    /// successful pass ran within the cool-down window (unless forced);
    /// local-only when not authenticated. Remote failures never raise: the
    /// collection falls back to the local copy, the error lands in
    /// `last_error`, and a best-effort background push is spawned.
    pub async fn reconcile_with_remote(&self, force_reload: bool) {
        {
            let mut last = self.last_reconcile.lock().expect("throttle lock poisoned");
            if !force_reload {
                if let Some(at) = *last {
                    if at.elapsed() < RECONCILE_COOLDOWN {
                        debug!("skipping reconcile inside cool-down window");
                        return;
                    }
                }
            }
            *last = Some(Instant::now());
        }

        if !self.remote.is_authenticated() {
            self.load_local_first().await;
            return;
        }

        // One remote duplicate-cleanup pass per process lifetime, detached.
        if !self.cleanup_started.swap(true, Ordering::SeqCst) {
            let remote = Arc::clone(&self.remote);
            self.spawn_background(async move {
                if let Err(e) = cleanup_remote_duplicates(remote.as_ref()).await {
                    debug!(error = %e, "duplicate cleanup failed");
                }
            })
            .await;
        }

        if let Err(e) = self.try_reconcile().await {
            warn!(error = %e, "reconcile failed, falling back to local workouts");
            let local_workouts = self.local_union().await;
            {
                let mut state = self.state.write().await;
                state.workouts = local_workouts.clone();
                state.last_error = Some(format!("Failed to load workouts: {e}"));
            }

            let remote = Arc::clone(&self.remote);
            let state = Arc::clone(&self.state);
            self.spawn_background(async move {
                match remote.upsert_workouts(&local_workouts).await {
                    Ok(()) => state.write().await.last_error = None,
                    Err(e) => {
                        debug!(error = %e, "background workout push failed");
                        state.write().await.last_error =
                            Some(format!("Failed to save workouts: {e}"));
                    }
                }
            })
            .await;
        }
    }

    /// The local side of a merge: the persisted file plus anything living only
    /// in memory (e.g. a session restored from a snapshot, not yet saved).
    async fn local_union(&self) -> Vec<Workout> {
        let file_workouts = self.local.read_workouts().await;
        let memory_workouts = self.state.read().await.workouts.clone();
        merge_local_wins(file_workouts, &memory_workouts)
    }

    async fn try_reconcile(&self) -> Result<(), RemoteError> {
        let remote_workouts = self.remote.fetch_workouts().await?;
        let local_workouts = self.local_union().await;
        let mut merged = merge_local_wins(remote_workouts, &local_workouts);
        self.migrate_inline_photos(&mut merged).await;

        {
            let mut state = self.state.write().await;
            state.workouts = merged.clone();
            state.last_error = None;
        }

        if let Err(e) = self.local.write_workouts(&merged).await {
            warn!(error = %e, "failed to persist merged workouts locally");
            self.state.write().await.last_error = Some(format!("Failed to save workouts: {e}"));
        }

        self.remote.upsert_workouts(&merged).await?;
        Ok(())
    }

    /// One-time migration for documents from the inline-photo schema variant:
    /// uploads each base64 blob and rewrites the record to the returned URL.
    /// Failed items keep their inline data for the next pass.
    async fn migrate_inline_photos(&self, workouts: &mut [Workout]) {
        let Some(user_id) = self.remote.current_user_id() else {
            return;
        };
        for workout in workouts.iter_mut() {
            if workout.progress_photo_url.is_some() {
                workout.progress_photo_data = None;
                continue;
            }
            let Some(encoded) = workout.progress_photo_data.clone() else {
                continue;
            };
            let bytes = match BASE64.decode(encoded.as_bytes()) {
                Ok(bytes) => Bytes::from(bytes),
                Err(e) => {
                    warn!(workout_id = %workout.id, error = %e, "dropping unreadable inline photo");
                    workout.progress_photo_data = None;
                    continue;
                }
            };
            let path = progress_photo_path(user_id, workout.id);
            match self
                .remote
                .upload_binary(&self.photos_bucket, &path, bytes)
                .await
            {
                Ok(url) => {
                    debug!(workout_id = %workout.id, "migrated inline progress photo");
                    workout.progress_photo_url = Some(url);
                    workout.progress_photo_data = None;
                }
                Err(e) => warn!(workout_id = %workout.id, error = %e, "inline photo migration failed"),
            }
        }
    }

    /// Persists the full collection locally, then best-effort to the remote
    /// store. Only the local write can fail the call; a remote failure is
    /// recorded in `last_error`.
    pub async fn save(&self) -> anyhow::Result<()> {
        let workouts = {
            let mut guard = self.state.write().await;
            for workout in &mut guard.workouts {
                workout.refresh_max_weights();
            }
            if let Some(active) = &mut guard.active {
                active.refresh_max_weights();
            }
            guard.workouts.clone()
        };

        self.local
            .write_workouts(&workouts)
            .await
            .context("write workouts locally")?;

        match self.remote.upsert_workouts(&workouts).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                state.last_error = None;
                *self.last_reconcile.lock().expect("throttle lock poisoned") = Some(Instant::now());
            }
            Err(RemoteError::NotAuthenticated) => {}
            Err(e) => {
                warn!(error = %e, "remote workout sync failed");
                self.state.write().await.last_error = Some(format!("Failed to save workouts: {e}"));
            }
        }
        Ok(())
    }

    /// The single mutation funnel: sets the active workout, replaces or
    /// appends it in the collection by id, and saves.
    pub async fn update_active_workout(&self, workout: Workout) -> anyhow::Result<()> {
        {
            let mut guard = self.state.write().await;
            guard.active = Some(workout.clone());
            if let Some(existing) = guard.workouts.iter_mut().find(|w| w.id == workout.id) {
                *existing = workout;
            } else {
                guard.workouts.push(workout);
            }
        }
        self.save().await
    }

    /// Installs a workout restored from a session snapshot as the active
    /// session, appending it to the collection if absent. Does not save.
    pub(crate) async fn install_active(&self, workout: Workout) {
        let mut guard = self.state.write().await;
        if !guard.workouts.iter().any(|w| w.id == workout.id) {
            guard.workouts.push(workout.clone());
        }
        guard.active = Some(workout);
    }

    /// If no session is active, adopts one of today's workouts: the first
    /// non-ancillary one, else any workout logged today.
    pub async fn restore_active_workout(&self) {
        let mut guard = self.state.write().await;
        if guard.active.is_some() {
            return;
        }
        let today = OffsetDateTime::now_utc().date();
        let restored = {
            let todays: Vec<&Workout> = guard.workouts.iter().filter(|w| w.day() == today).collect();
            todays
                .iter()
                .find(|w| !w.is_ancillary())
                .or_else(|| todays.first())
                .map(|w| (**w).clone())
        };
        if let Some(workout) = restored {
            debug!(workout_id = %workout.id, name = %workout.name, "restored active workout");
            guard.active = Some(workout);
        }
    }

    /// Optimistic delete: the workout leaves the in-memory collection and the
    /// local file immediately; the remote delete is eventually consistent and
    /// reports failure only through `last_error`.
    pub async fn delete_workout(&self, workout_id: Uuid) -> anyhow::Result<()> {
        {
            let mut guard = self.state.write().await;
            guard.workouts.retain(|w| w.id != workout_id);
        }
        self.save().await?;

        match self.remote.delete_workout(workout_id).await {
            Ok(()) | Err(RemoteError::NotAuthenticated) => {}
            Err(e) => {
                warn!(workout_id = %workout_id, error = %e, "remote workout delete failed");
                self.state.write().await.last_error =
                    Some(format!("Failed to delete workout: {e}"));
            }
        }
        Ok(())
    }

    /// Uploads a progress photo and rewrites the matching workout (and the
    /// active copy, when it is the same workout) to the returned URL. When
    /// unauthenticated the photo is kept inline in the local document and
    /// migrated on the next authenticated reconcile.
    pub async fn upload_progress_photo(
        &self,
        bytes: Bytes,
        workout_id: Uuid,
    ) -> anyhow::Result<()> {
        match self.remote.current_user_id() {
            Some(user_id) => {
                let path = progress_photo_path(user_id, workout_id);
                match self
                    .remote
                    .upload_binary(&self.photos_bucket, &path, bytes)
                    .await
                {
                    Ok(url) => {
                        self.set_photo(workout_id, Some(url), None).await;
                        self.save().await?;
                    }
                    Err(e) => {
                        warn!(workout_id = %workout_id, error = %e, "progress photo upload failed");
                        self.state.write().await.last_error =
                            Some(format!("Failed to upload progress photo: {e}"));
                    }
                }
            }
            None => {
                let encoded = BASE64.encode(&bytes);
                self.set_photo(workout_id, None, Some(encoded)).await;
                self.save().await?;
            }
        }
        Ok(())
    }

    async fn set_photo(&self, workout_id: Uuid, url: Option<String>, data: Option<String>) {
        let mut guard = self.state.write().await;
        if let Some(workout) = guard.workouts.iter_mut().find(|w| w.id == workout_id) {
            workout.progress_photo_url = url.clone();
            workout.progress_photo_data = data.clone();
        }
        if let Some(active) = &mut guard.active {
            if active.id == workout_id {
                active.progress_photo_url = url;
                active.progress_photo_data = data;
            }
        }
    }

    /// Remote-side maintenance: collapses duplicate (day, name) rows down to
    /// the most-recently-created one. Normally spawned once per process from
    /// `reconcile_with_remote`; callable directly for deterministic tests.
    pub async fn duplicate_cleanup(&self) -> Result<(), RemoteError> {
        cleanup_remote_duplicates(self.remote.as_ref()).await
    }

    /// Clears in-memory state and the local file. Remote rows stay; they are
    /// scoped by user id and re-fetched on the next sign-in.
    pub async fn reset(&self) -> anyhow::Result<()> {
        {
            let mut guard = self.state.write().await;
            guard.workouts.clear();
            guard.active = None;
            guard.last_error = None;
        }
        *self.last_reconcile.lock().expect("throttle lock poisoned") = None;
        self.local.delete_workouts().await
    }

    async fn spawn_background<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.background.lock().await.spawn(task);
    }

    /// Awaits all outstanding fire-and-forget work (cleanup, fallback pushes).
    /// Used by shutdown and tests.
    pub async fn drain_background(&self) {
        let mut background = self.background.lock().await;
        while background.join_next().await.is_some() {}
    }
}

fn progress_photo_path(user_id: Uuid, workout_id: Uuid) -> String {
    format!("users/{user_id}/workouts/{workout_id}.jpg")
}

/// Local-wins merge: remote rows in fetch order, each replaced by the local
/// version on id collision, with local-only workouts appended.
fn merge_local_wins(remote: Vec<Workout>, local: &[Workout]) -> Vec<Workout> {
    let mut merged = remote;
    for local_workout in local {
        if let Some(existing) = merged.iter_mut().find(|w| w.id == local_workout.id) {
            *existing = local_workout.clone();
        } else {
            merged.push(local_workout.clone());
        }
    }
    merged
}

/// Groups the user's remote rows by (calendar day, name) and deletes all but
/// the most-recently-created member of each group. Rows without a creation
/// timestamp are the least preferred.
async fn cleanup_remote_duplicates(remote: &dyn RemoteGateway) -> Result<(), RemoteError> {
    let rows = remote.fetch_workouts().await?;
    let mut groups: HashMap<(Date, String), Vec<&Workout>> = HashMap::new();
    for row in &rows {
        groups
            .entry((row.day(), row.name.clone()))
            .or_default()
            .push(row);
    }

    for ((day, name), mut group) in groups {
        if group.len() <= 1 {
            continue;
        }
        group.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        for duplicate in group.iter().skip(1) {
            if let Err(e) = remote.delete_workout(duplicate.id).await {
                warn!(workout_id = %duplicate.id, error = %e, "failed to delete duplicate workout");
            }
        }
        debug!(%day, name, removed = group.len() - 1, "removed duplicate workouts");
    }
    Ok(())
}

#[cfg(test)]
mod repo_tests {
    use super::*;
    use crate::remote::memory::MemoryGateway;
    use crate::workouts::model::{ExerciseEntry, WorkoutSet};
    use time::macros::datetime;

    fn workout_with_sets(id: Uuid, name: &str, date: OffsetDateTime, set_count: usize) -> Workout {
        let mut workout = Workout::new(name, date);
        workout.id = id;
        workout.exercises.push(ExerciseEntry::new(
            Uuid::new_v4(),
            "Bench Press",
            (0..set_count).map(|_| WorkoutSet::new(5, 225.0)).collect(),
        ));
        workout
    }

    async fn setup() -> (tempfile::TempDir, Arc<LocalStore>, Arc<MemoryGateway>, WorkoutRepository)
    {
        let dir = tempfile::tempdir().expect("tempdir");
        let local = Arc::new(LocalStore::new(dir.path()).await.expect("store"));
        let gateway = Arc::new(MemoryGateway::authenticated(Uuid::new_v4()));
        let repo = WorkoutRepository::new(
            Arc::clone(&local),
            Arc::clone(&gateway) as Arc<dyn RemoteGateway>,
            "progress-photos",
        );
        (dir, local, gateway, repo)
    }

    #[tokio::test]
    async fn reconcile_merges_with_local_wins() {
        let (_dir, local, gateway, repo) = setup().await;
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();

        let local_a = workout_with_sets(id_a, "Push Day", datetime!(2024-01-01 09:00 UTC), 3);
        local.write_workouts(&[local_a.clone()]).await.unwrap();

        gateway.seed_workout(workout_with_sets(id_a, "Push Day", datetime!(2024-01-01 09:00 UTC), 1));
        gateway.seed_workout(workout_with_sets(id_b, "Leg Day", datetime!(2024-01-02 09:00 UTC), 2));

        repo.reconcile_with_remote(true).await;

        let merged = repo.workouts().await;
        assert_eq!(merged.len(), 2);
        let a = merged.iter().find(|w| w.id == id_a).unwrap();
        assert_eq!(a.exercises[0].sets.len(), 3, "local content wins on collision");
        assert!(merged.iter().any(|w| w.id == id_b), "remote-only workout kept");

        // merged set persisted locally and pushed remotely
        assert_eq!(local.read_workouts().await.len(), 2);
        let pushed = gateway.remote_workouts();
        let remote_a = pushed.iter().find(|w| w.id == id_a).unwrap();
        assert_eq!(remote_a.exercises[0].sets.len(), 3);
        assert!(repo.last_error().await.is_none());
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let (_dir, local, gateway, repo) = setup().await;
        let id = Uuid::new_v4();
        local
            .write_workouts(&[workout_with_sets(id, "Push Day", datetime!(2024-01-01 09:00 UTC), 3)])
            .await
            .unwrap();
        gateway.seed_workout(workout_with_sets(id, "Push Day", datetime!(2024-01-01 09:00 UTC), 1));

        repo.reconcile_with_remote(true).await;
        let first = repo.workouts().await;
        repo.reconcile_with_remote(true).await;
        let second = repo.workouts().await;

        assert_eq!(first.len(), second.len(), "no duplicate growth");
        assert_eq!(first.iter().map(|w| w.id).collect::<Vec<_>>(),
                   second.iter().map(|w| w.id).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_is_throttled_inside_cooldown() {
        let (_dir, _local, gateway, repo) = setup().await;
        repo.reconcile_with_remote(false).await;

        gateway.seed_workout(workout_with_sets(
            Uuid::new_v4(),
            "Leg Day",
            datetime!(2024-01-02 09:00 UTC),
            1,
        ));

        repo.reconcile_with_remote(false).await;
        assert!(repo.workouts().await.is_empty(), "second call skipped in window");

        tokio::time::advance(Duration::from_secs(31)).await;
        repo.reconcile_with_remote(false).await;
        assert_eq!(repo.workouts().await.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_falls_back_to_local_on_remote_failure() {
        let (_dir, local, gateway, repo) = setup().await;
        let id = Uuid::new_v4();
        local
            .write_workouts(&[workout_with_sets(id, "Push Day", datetime!(2024-01-01 09:00 UTC), 3)])
            .await
            .unwrap();

        gateway.set_failing(true);
        repo.reconcile_with_remote(true).await;
        repo.drain_background().await;

        let workouts = repo.workouts().await;
        assert_eq!(workouts.len(), 1);
        assert_eq!(workouts[0].id, id);
        assert!(repo.last_error().await.is_some());
        assert!(gateway.remote_workouts().is_empty());
    }

    #[tokio::test]
    async fn fallback_spawns_best_effort_push_of_local_collection() {
        let (_dir, local, gateway, repo) = setup().await;
        let id = Uuid::new_v4();
        local
            .write_workouts(&[workout_with_sets(id, "Push Day", datetime!(2024-01-01 09:00 UTC), 3)])
            .await
            .unwrap();

        // fetch fails, writes still work: reconcile degrades to the local
        // collection and the background push lands it remotely
        gateway.set_failing_fetches(true);
        repo.reconcile_with_remote(true).await;
        repo.drain_background().await;

        assert_eq!(repo.workouts().await.len(), 1);
        let pushed = gateway.remote_workouts();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].id, id);
        assert!(repo.last_error().await.is_none(), "push completion clears the error");
    }

    #[tokio::test]
    async fn unauthenticated_reconcile_loads_local_only() {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalStore::new(dir.path()).await.unwrap());
        let gateway = Arc::new(MemoryGateway::new());
        let repo = WorkoutRepository::new(
            Arc::clone(&local),
            Arc::clone(&gateway) as Arc<dyn RemoteGateway>,
            "progress-photos",
        );

        let id = Uuid::new_v4();
        local
            .write_workouts(&[workout_with_sets(id, "Push Day", datetime!(2024-01-01 09:00 UTC), 2)])
            .await
            .unwrap();

        repo.reconcile_with_remote(true).await;
        assert_eq!(repo.workouts().await.len(), 1);
        assert!(repo.last_error().await.is_none());
        assert!(gateway.remote_workouts().is_empty());
    }

    #[tokio::test]
    async fn duplicate_cleanup_keeps_most_recent_of_each_group() {
        let (_dir, _local, gateway, repo) = setup().await;

        let mut older = workout_with_sets(Uuid::new_v4(), "Pull Day", datetime!(2024-02-01 09:00 UTC), 1);
        older.created_at = Some(datetime!(2024-02-01 09:00 UTC));
        let mut newer = workout_with_sets(Uuid::new_v4(), "Pull Day", datetime!(2024-02-01 18:00 UTC), 2);
        newer.created_at = Some(datetime!(2024-02-01 18:05 UTC));
        let unrelated = workout_with_sets(Uuid::new_v4(), "Leg Day", datetime!(2024-02-01 10:00 UTC), 1);

        gateway.seed_workout(older.clone());
        gateway.seed_workout(newer.clone());
        gateway.seed_workout(unrelated.clone());

        repo.duplicate_cleanup().await.unwrap();

        let remaining = gateway.remote_workouts();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|w| w.id == newer.id));
        assert!(remaining.iter().any(|w| w.id == unrelated.id));
        assert_eq!(gateway.deleted_workout_ids(), vec![older.id]);
    }

    #[tokio::test]
    async fn duplicate_cleanup_is_spawned_once_per_process() {
        let (_dir, _local, gateway, repo) = setup().await;

        let mut older = workout_with_sets(Uuid::new_v4(), "Pull Day", datetime!(2024-02-01 09:00 UTC), 1);
        older.created_at = Some(datetime!(2024-02-01 09:00 UTC));
        let mut newer = workout_with_sets(Uuid::new_v4(), "Pull Day", datetime!(2024-02-01 18:00 UTC), 2);
        newer.created_at = Some(datetime!(2024-02-01 18:05 UTC));
        gateway.seed_workout(older.clone());
        gateway.seed_workout(newer.clone());

        repo.reconcile_with_remote(true).await;
        repo.drain_background().await;
        assert_eq!(gateway.deleted_workout_ids(), vec![older.id]);

        // the reconcile upsert pushes the merged set (duplicates included)
        // back to the remote rows, so a second cleanup pass would delete
        // again; the latch keeps it to the first reconcile only
        repo.reconcile_with_remote(true).await;
        repo.drain_background().await;
        assert_eq!(gateway.deleted_workout_ids().len(), 1);
    }

    #[tokio::test]
    async fn update_active_workout_funnels_into_collection_and_save() {
        let (_dir, local, gateway, repo) = setup().await;

        let mut workout = workout_with_sets(Uuid::new_v4(), "Push Day", OffsetDateTime::now_utc(), 1);
        repo.update_active_workout(workout.clone()).await.unwrap();
        assert_eq!(repo.workouts().await.len(), 1);

        // editing the same workout replaces, never duplicates
        workout
            .exercises
            .push(ExerciseEntry::new(Uuid::new_v4(), "Incline Press", vec![WorkoutSet::new(8, 135.0)]));
        repo.update_active_workout(workout.clone()).await.unwrap();

        let collection = repo.workouts().await;
        assert_eq!(collection.len(), 1);
        assert_eq!(collection[0].exercises.len(), 2);
        assert_eq!(local.read_workouts().await.len(), 1);
        assert_eq!(gateway.remote_workouts().len(), 1);
        assert_eq!(repo.active_workout().await.unwrap().id, workout.id);
    }

    #[tokio::test]
    async fn save_refreshes_max_weight_caches() {
        let (_dir, local, _gateway, repo) = setup().await;
        let mut workout = workout_with_sets(Uuid::new_v4(), "Push Day", OffsetDateTime::now_utc(), 1);
        workout.exercises[0].sets.push(WorkoutSet::new(3, 315.0));
        workout.exercises[0].max_weight = Some(1.0); // stale cache

        repo.update_active_workout(workout).await.unwrap();

        let saved = local.read_workouts().await;
        assert_eq!(saved[0].exercises[0].max_weight, Some(315.0));
    }

    #[tokio::test]
    async fn restore_active_workout_prefers_non_ancillary() {
        let (_dir, _local, _gateway, repo) = setup().await;
        let now = OffsetDateTime::now_utc();

        let weight_update = workout_with_sets(Uuid::new_v4(), "Weight Update", now, 0);
        let push_day = workout_with_sets(Uuid::new_v4(), "Push Day", now, 1);
        {
            let mut guard = repo.state.write().await;
            guard.workouts = vec![weight_update.clone(), push_day.clone()];
        }

        repo.restore_active_workout().await;
        assert_eq!(repo.active_workout().await.unwrap().id, push_day.id);
    }

    #[tokio::test]
    async fn restore_active_workout_falls_back_to_ancillary_and_respects_existing() {
        let (_dir, _local, _gateway, repo) = setup().await;
        let now = OffsetDateTime::now_utc();

        let photo = workout_with_sets(Uuid::new_v4(), "Progress Photo", now, 0);
        {
            let mut guard = repo.state.write().await;
            guard.workouts = vec![photo.clone()];
        }
        repo.restore_active_workout().await;
        assert_eq!(repo.active_workout().await.unwrap().id, photo.id);

        // a second restore never replaces an existing session
        let other = workout_with_sets(Uuid::new_v4(), "Push Day", now, 1);
        {
            let mut guard = repo.state.write().await;
            guard.workouts.push(other);
        }
        repo.restore_active_workout().await;
        assert_eq!(repo.active_workout().await.unwrap().id, photo.id);
    }

    #[tokio::test]
    async fn delete_is_optimistic_on_remote_failure() {
        let (_dir, local, gateway, repo) = setup().await;
        let workout = workout_with_sets(Uuid::new_v4(), "Push Day", OffsetDateTime::now_utc(), 1);
        repo.update_active_workout(workout.clone()).await.unwrap();

        gateway.set_failing(true);
        repo.delete_workout(workout.id).await.unwrap();

        assert!(repo.workouts().await.is_empty(), "local removal sticks");
        assert!(local.read_workouts().await.is_empty());
        assert!(repo.last_error().await.is_some());
    }

    #[tokio::test]
    async fn upload_progress_photo_rewrites_references() {
        let (_dir, _local, gateway, repo) = setup().await;
        let workout = workout_with_sets(Uuid::new_v4(), "Push Day", OffsetDateTime::now_utc(), 1);
        repo.update_active_workout(workout.clone()).await.unwrap();

        repo.upload_progress_photo(Bytes::from_static(b"jpeg bytes"), workout.id)
            .await
            .unwrap();

        let user_id = gateway.current_user_id().unwrap();
        let expected_path = format!("users/{}/workouts/{}.jpg", user_id, workout.id);
        assert!(gateway.uploaded("progress-photos", &expected_path).is_some());

        let url = format!("memory://progress-photos/{expected_path}");
        let stored = repo.workouts().await;
        assert_eq!(stored[0].progress_photo_url.as_deref(), Some(url.as_str()));
        assert_eq!(
            repo.active_workout().await.unwrap().progress_photo_url.as_deref(),
            Some(url.as_str())
        );
        let remote = gateway.remote_workouts();
        assert_eq!(remote[0].progress_photo_url.as_deref(), Some(url.as_str()));
    }

    #[tokio::test]
    async fn upload_failure_records_error_and_leaves_state() {
        let (_dir, _local, gateway, repo) = setup().await;
        let workout = workout_with_sets(Uuid::new_v4(), "Push Day", OffsetDateTime::now_utc(), 1);
        repo.update_active_workout(workout.clone()).await.unwrap();

        gateway.set_failing(true);
        repo.upload_progress_photo(Bytes::from_static(b"jpeg"), workout.id)
            .await
            .unwrap();

        assert!(repo.last_error().await.is_some());
        let stored = repo.workouts().await;
        assert!(stored[0].progress_photo_url.is_none());
        assert!(stored[0].progress_photo_data.is_none());
    }

    #[tokio::test]
    async fn inline_photo_is_kept_offline_and_migrated_after_sign_in() {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalStore::new(dir.path()).await.unwrap());
        let gateway = Arc::new(MemoryGateway::new());
        let repo = WorkoutRepository::new(
            Arc::clone(&local),
            Arc::clone(&gateway) as Arc<dyn RemoteGateway>,
            "progress-photos",
        );

        let workout = workout_with_sets(Uuid::new_v4(), "Push Day", OffsetDateTime::now_utc(), 1);
        repo.update_active_workout(workout.clone()).await.unwrap();
        repo.upload_progress_photo(Bytes::from_static(b"offline photo"), workout.id)
            .await
            .unwrap();

        let stored = repo.workouts().await;
        assert_eq!(stored[0].progress_photo_data.as_deref(), Some(BASE64.encode(b"offline photo").as_str()));
        assert!(stored[0].progress_photo_url.is_none());

        gateway.sign_in(Uuid::new_v4());
        repo.reconcile_with_remote(true).await;

        let migrated = repo.workouts().await;
        assert!(migrated[0].progress_photo_url.is_some());
        assert!(migrated[0].progress_photo_data.is_none());
        let remote = gateway.remote_workouts();
        assert!(remote[0].progress_photo_url.is_some());
        // inline data never reaches the remote rows
        assert!(remote[0].progress_photo_data.is_none());
    }

    #[tokio::test]
    async fn save_propagates_local_write_failure() {
        let (dir, _local, _gateway, repo) = setup().await;
        let workout = workout_with_sets(Uuid::new_v4(), "Push Day", OffsetDateTime::now_utc(), 1);

        std::fs::remove_dir_all(dir.path()).unwrap();
        let err = repo.update_active_workout(workout).await.unwrap_err();
        assert!(err.to_string().contains("write workouts locally"));
    }

    #[tokio::test]
    async fn reset_clears_memory_and_local_file() {
        let (_dir, local, _gateway, repo) = setup().await;
        let workout = workout_with_sets(Uuid::new_v4(), "Push Day", OffsetDateTime::now_utc(), 1);
        repo.update_active_workout(workout).await.unwrap();

        repo.reset().await.unwrap();
        assert!(repo.workouts().await.is_empty());
        assert!(repo.active_workout().await.is_none());
        assert!(local.read_workouts().await.is_empty());
    }

    #[test]
    fn merge_local_wins_unit() {
        let id = Uuid::new_v4();
        let remote_version = workout_with_sets(id, "Push Day", datetime!(2024-01-01 09:00 UTC), 1);
        let local_version = workout_with_sets(id, "Push Day", datetime!(2024-01-01 09:00 UTC), 3);
        let local_only = workout_with_sets(Uuid::new_v4(), "Leg Day", datetime!(2024-01-03 09:00 UTC), 2);

        let merged = merge_local_wins(
            vec![remote_version],
            &[local_version.clone(), local_only.clone()],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], local_version);
        assert_eq!(merged[1], local_only);

        // merging again changes nothing
        let again = merge_local_wins(merged.clone(), &[local_version, local_only]);
        assert_eq!(again, merged);
    }
}
