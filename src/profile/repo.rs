use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::debounce::Debouncer;
use crate::profile::model::{BodyWeightGoal, ExerciseGoal, UserProfile, WorkoutDay};
use crate::remote::{RemoteError, RemoteGateway};
use crate::storage::LocalStore;

/// Rapid successive edits inside this window coalesce into one write.
const SAVE_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Default)]
struct State {
    profile: Option<UserProfile>,
    last_error: Option<String>,
}

/// Owner of the user profile aggregate. Remote-first on load when
/// authenticated, local file as the durable fallback, and a debounced save so
/// bursts of field edits (live text input) cost one write.
pub struct ProfileRepository {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteGateway>,
    images_bucket: String,
    state: Arc<RwLock<State>>,
    debouncer: Debouncer,
    background: Mutex<JoinSet<()>>,
}

impl ProfileRepository {
    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteGateway>,
        images_bucket: impl Into<String>,
    ) -> Self {
        Self {
            local,
            remote,
            images_bucket: images_bucket.into(),
            state: Arc::new(RwLock::new(State::default())),
            debouncer: Debouncer::new(SAVE_DEBOUNCE),
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        self.state.read().await.profile.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    pub async fn load_local_first(&self) {
        let profile = self.local.read_profile().await;
        self.state.write().await.profile = profile;
    }

    /// Full reconcile. Unauthenticated: local only. Authenticated: adopt the
    /// remote profile and back it up locally; on remote failure or absence,
    /// fall back to the local file and push it remotely in the background.
    pub async fn load(&self) {
        if !self.remote.is_authenticated() {
            self.load_local_first().await;
            return;
        }

        match self.remote.fetch_profile().await {
            Ok(Some(profile)) => {
                {
                    let mut state = self.state.write().await;
                    state.profile = Some(profile.clone());
                    state.last_error = None;
                }
                if let Err(e) = self.local.write_profile(&profile).await {
                    warn!(error = %e, "failed to back up remote profile locally");
                    self.state.write().await.last_error =
                        Some(format!("Failed to save profile: {e}"));
                }
                return;
            }
            Ok(None) => debug!("no remote profile yet"),
            Err(e) => warn!(error = %e, "remote profile fetch failed, falling back to local"),
        }

        let profile = self.local.read_profile().await;
        self.state.write().await.profile = profile.clone();

        if let Some(profile) = profile {
            let remote = Arc::clone(&self.remote);
            let state = Arc::clone(&self.state);
            self.background.lock().await.spawn(async move {
                match remote.upsert_profile(&profile).await {
                    Ok(()) => state.write().await.last_error = None,
                    Err(e) => {
                        debug!(error = %e, "background profile push failed");
                        state.write().await.last_error =
                            Some(format!("Failed to save profile: {e}"));
                    }
                }
            });
        }
    }

    /// Debounced save: a new request supersedes any pending one, and the
    /// flush reads the profile as it is at fire time, so a burst of edits
    /// writes the final state exactly once. Failures inside the detached
    /// flush land in `last_error`; callers needing a durability guarantee use
    /// `save_now`.
    pub async fn save(&self) {
        let local = Arc::clone(&self.local);
        let remote = Arc::clone(&self.remote);
        let state = Arc::clone(&self.state);
        self.debouncer
            .trigger(move || flush_profile(local, remote, state))
            .await;
    }

    /// Immediate save, skipping and cancelling the debounce. The one
    /// save-family call that propagates local I/O failure.
    pub async fn save_now(&self) -> anyhow::Result<()> {
        self.debouncer.cancel().await;
        let profile = self.state.read().await.profile.clone();
        let Some(profile) = profile else {
            return Ok(());
        };
        self.local
            .write_profile(&profile)
            .await
            .context("write profile locally")?;
        match self.remote.upsert_profile(&profile).await {
            Ok(()) => self.state.write().await.last_error = None,
            Err(RemoteError::NotAuthenticated) => {}
            Err(e) => {
                warn!(error = %e, "remote profile sync failed");
                self.state.write().await.last_error = Some(format!("Failed to save profile: {e}"));
            }
        }
        Ok(())
    }

    pub async fn update_profile(&self, profile: UserProfile) {
        self.state.write().await.profile = Some(profile);
        self.save().await;
    }

    pub async fn update_goals(&self, goals: Vec<ExerciseGoal>) {
        if let Some(profile) = &mut self.state.write().await.profile {
            profile.goals = goals;
        }
        self.save().await;
    }

    pub async fn update_workout_split(&self, split: Vec<WorkoutDay>) {
        if let Some(profile) = &mut self.state.write().await.profile {
            profile.workout_split = split;
        }
        self.save().await;
    }

    pub async fn update_body_weight_goal(&self, goal: Option<BodyWeightGoal>) {
        if let Some(profile) = &mut self.state.write().await.profile {
            profile.body_weight_goal = goal;
        }
        self.save().await;
    }

    /// Uploads a new profile image and stores its URL; `None` clears the
    /// reference. Upload has no local fallback, so failure is reported
    /// through `last_error`.
    pub async fn update_profile_image(&self, image: Option<Bytes>) {
        let Some(bytes) = image else {
            if let Some(profile) = &mut self.state.write().await.profile {
                profile.profile_image_url = None;
            }
            self.save().await;
            return;
        };

        let result = match self.remote.current_user_id() {
            Some(user_id) => {
                let path = format!("users/{user_id}/profile.jpg");
                self.remote
                    .upload_binary(&self.images_bucket, &path, bytes)
                    .await
            }
            None => Err(RemoteError::NotAuthenticated),
        };

        match result {
            Ok(url) => {
                if let Some(profile) = &mut self.state.write().await.profile {
                    profile.profile_image_url = Some(url);
                }
                self.save().await;
            }
            Err(e) => {
                warn!(error = %e, "profile image upload failed");
                self.state.write().await.last_error =
                    Some(format!("Failed to upload profile image: {e}"));
            }
        }
    }

    /// Clears the in-memory profile, drops any pending debounced save, and
    /// deletes the local file. Remote rows stay; they are scoped by user id.
    pub async fn reset(&self) -> anyhow::Result<()> {
        self.debouncer.cancel().await;
        {
            let mut state = self.state.write().await;
            state.profile = None;
            state.last_error = None;
        }
        self.local.delete_profile().await
    }

    /// Awaits the pending debounced flush, if any.
    pub async fn settle_pending_save(&self) {
        self.debouncer.settle().await;
    }

    /// Awaits outstanding background pushes.
    pub async fn drain_background(&self) {
        let mut background = self.background.lock().await;
        while background.join_next().await.is_some() {}
    }
}

/// Debounce flush body. Reads the profile at fire time so superseded calls
/// can never write back stale data.
async fn flush_profile(
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteGateway>,
    state: Arc<RwLock<State>>,
) {
    let profile = state.read().await.profile.clone();
    let Some(profile) = profile else {
        return;
    };

    if let Err(e) = local.write_profile(&profile).await {
        warn!(error = %e, "debounced profile write failed");
        state.write().await.last_error = Some(format!("Failed to save profile: {e}"));
        return;
    }

    match remote.upsert_profile(&profile).await {
        Ok(()) => state.write().await.last_error = None,
        Err(RemoteError::NotAuthenticated) => {}
        Err(e) => {
            warn!(error = %e, "remote profile sync failed");
            state.write().await.last_error = Some(format!("Failed to save profile: {e}"));
        }
    }
}
