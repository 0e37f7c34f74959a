use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub profile_images_bucket: String,
    pub progress_photos_bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub supabase: Option<SupabaseConfig>,
}

impl AppConfig {
    /// Reads configuration from the environment. `SUPABASE_URL` and
    /// `SUPABASE_ANON_KEY` are optional as a pair: without them the app runs
    /// local-only against an unauthenticated gateway.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let data_dir = std::env::var("APP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let supabase = match (
            std::env::var("SUPABASE_URL").ok(),
            std::env::var("SUPABASE_ANON_KEY").ok(),
        ) {
            (Some(url), Some(anon_key)) => Some(SupabaseConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
                profile_images_bucket: std::env::var("SUPABASE_PROFILE_IMAGES_BUCKET")
                    .unwrap_or_else(|_| "profile-images".into()),
                progress_photos_bucket: std::env::var("SUPABASE_PROGRESS_PHOTOS_BUCKET")
                    .unwrap_or_else(|_| "progress-photos".into()),
            }),
            (None, None) => None,
            _ => anyhow::bail!("SUPABASE_URL and SUPABASE_ANON_KEY must be set together"),
        };

        Ok(Self { data_dir, supabase })
    }
}
