use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::profile::repo::ProfileRepository;
use crate::remote::memory::MemoryGateway;
use crate::remote::supabase::SupabaseGateway;
use crate::remote::RemoteGateway;
use crate::session::SessionSnapshotManager;
use crate::storage::LocalStore;
use crate::workouts::repo::WorkoutRepository;

const DEFAULT_PROFILE_IMAGES_BUCKET: &str = "profile-images";
const DEFAULT_PROGRESS_PHOTOS_BUCKET: &str = "progress-photos";

/// Application container wiring the local store, the remote gateway and the
/// repositories together. Cheap to clone and share.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub local: Arc<LocalStore>,
    pub remote: Arc<dyn RemoteGateway>,
    pub workouts: Arc<WorkoutRepository>,
    pub profile: Arc<ProfileRepository>,
    pub session: Arc<SessionSnapshotManager>,
    selected_workout_day: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Builds the container from the environment. With Supabase credentials
    /// configured the remote gateway talks to Supabase; without them the app
    /// runs against an unauthenticated in-memory gateway, i.e. local-only.
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let local = Arc::new(LocalStore::new(config.data_dir.clone()).await?);

        let (remote, images_bucket, photos_bucket): (Arc<dyn RemoteGateway>, String, String) =
            match &config.supabase {
                Some(supabase) => {
                    info!(url = %supabase.url, "using supabase remote store");
                    (
                        Arc::new(SupabaseGateway::new(supabase.clone())?),
                        supabase.profile_images_bucket.clone(),
                        supabase.progress_photos_bucket.clone(),
                    )
                }
                None => {
                    info!("no remote store configured, running local-only");
                    (
                        Arc::new(MemoryGateway::new()),
                        DEFAULT_PROFILE_IMAGES_BUCKET.into(),
                        DEFAULT_PROGRESS_PHOTOS_BUCKET.into(),
                    )
                }
            };

        Ok(Self::from_parts(
            config,
            local,
            remote,
            images_bucket,
            photos_bucket,
        ))
    }

    /// Assembles the container from pre-built parts. Tests use this with a
    /// temp-dir store and a [`MemoryGateway`].
    pub fn from_parts(
        config: AppConfig,
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteGateway>,
        images_bucket: impl Into<String>,
        photos_bucket: impl Into<String>,
    ) -> Self {
        let workouts = Arc::new(WorkoutRepository::new(
            Arc::clone(&local),
            Arc::clone(&remote),
            photos_bucket,
        ));
        let profile = Arc::new(ProfileRepository::new(
            Arc::clone(&local),
            Arc::clone(&remote),
            images_bucket,
        ));
        let session = Arc::new(SessionSnapshotManager::new(Arc::clone(&local)));

        Self {
            config: Arc::new(config),
            local,
            remote,
            workouts,
            profile,
            session,
            selected_workout_day: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn selected_workout_day(&self) -> Option<String> {
        self.selected_workout_day.read().await.clone()
    }

    pub async fn select_workout_day(&self, name: Option<String>) {
        *self.selected_workout_day.write().await = name;
    }

    /// Launch sequence: surface local data immediately, restore the previous
    /// session, then reconcile with the remote store.
    pub async fn startup(&self) {
        self.workouts.load_local_first().await;
        self.profile.load_local_first().await;

        let (selected, restored) = self.session.restore_snapshot(&self.workouts).await;
        if selected.is_some() {
            self.select_workout_day(selected).await;
        }
        if !restored {
            self.workouts.restore_active_workout().await;
        }

        self.workouts.reconcile_with_remote(false).await;
        self.profile.load().await;
    }

    /// Shutdown/backgrounding sequence: flush the debounced profile save,
    /// snapshot the session, and let in-flight background pushes finish.
    pub async fn shutdown(&self) {
        if let Err(e) = self.profile.save_now().await {
            warn!(error = %e, "failed to flush profile on shutdown");
        }

        let selected = self.selected_workout_day().await;
        let active = self.workouts.active_workout().await;
        if let Err(e) = self
            .session
            .save_snapshot(selected.as_deref(), active.as_ref())
            .await
        {
            warn!(error = %e, "failed to write session snapshot");
        }

        self.workouts.drain_background().await;
        self.profile.drain_background().await;
    }

    /// Logout: clear every local document and reset both repositories.
    pub async fn sign_out(&self) -> anyhow::Result<()> {
        self.workouts.reset().await?;
        self.profile.reset().await?;
        self.session.clear().await?;
        self.select_workout_day(None).await;
        Ok(())
    }
}
