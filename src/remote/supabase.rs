use std::sync::RwLock;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use super::{RemoteError, RemoteGateway};
use crate::config::SupabaseConfig;
use crate::profile::model::{BodyWeightGoal, ExerciseGoal, UserProfile, WorkoutDay};
use crate::workouts::model::{ExerciseEntry, Workout};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const WORKOUTS_TABLE: &str = "workouts";
const PROFILES_TABLE: &str = "user_profiles";

/// An authenticated Supabase session. Produced by the auth layer (out of
/// scope here) and handed to the gateway; cleared on sign-out.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
}

/// `RemoteGateway` over the Supabase REST (PostgREST) and storage APIs.
pub struct SupabaseGateway {
    http: reqwest::Client,
    config: SupabaseConfig,
    session: RwLock<Option<Session>>,
}

impl SupabaseGateway {
    pub fn new(config: SupabaseConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            config,
            session: RwLock::new(None),
        })
    }

    pub fn set_session(&self, session: Session) {
        *self.session.write().expect("session lock poisoned") = Some(session);
    }

    pub fn clear_session(&self) {
        *self.session.write().expect("session lock poisoned") = None;
    }

    fn require_session(&self) -> Result<Session, RemoteError> {
        self.session
            .read()
            .expect("session lock poisoned")
            .clone()
            .ok_or(RemoteError::NotAuthenticated)
    }

    fn headers(&self, session: &Session) -> Result<HeaderMap, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.config.anon_key)
                .map_err(|e| RemoteError::Decode(e.to_string()))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", session.access_token))
                .map_err(|e| RemoteError::Decode(e.to_string()))?,
        );
        Ok(headers)
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url, table)
    }

    fn object_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.config.url, bucket, path)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url, bucket, path
        )
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Bytes) -> Result<String, RemoteError> {
        let session = self.require_session()?;
        let mut headers = self.headers(&session)?;
        headers.insert("x-upsert", HeaderValue::from_static("true"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));

        let resp = self
            .http
            .post(self.object_url(bucket, path))
            .headers(headers)
            .body(bytes)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(self.public_url(bucket, path))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteError::NotAuthenticated);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Row shape of the `workouts` table. `exercises` is a nested JSON column
/// whose element shape matches the domain model. There is no column for the
/// inline photo fallback; only URLs go to the remote store.
#[derive(Debug, Serialize, Deserialize)]
struct WorkoutRow {
    id: Uuid,
    user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    date: OffsetDateTime,
    name: String,
    #[serde(default)]
    exercises: Vec<ExerciseEntry>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    body_weight: Option<f64>,
    #[serde(default)]
    progress_photo_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}

impl WorkoutRow {
    fn from_workout(workout: &Workout, user_id: Uuid) -> Self {
        Self {
            id: workout.id,
            user_id,
            date: workout.date,
            name: workout.name.clone(),
            exercises: workout.exercises.clone(),
            notes: workout.notes.clone(),
            duration: workout.duration_secs.map(|d| d as i64),
            body_weight: workout.body_weight,
            progress_photo_url: workout.progress_photo_url.clone(),
            created_at: workout.created_at.or_else(|| Some(OffsetDateTime::now_utc())),
            updated_at: Some(OffsetDateTime::now_utc()),
        }
    }

    fn into_workout(self) -> Workout {
        Workout {
            id: self.id,
            date: self.date,
            name: self.name,
            exercises: self.exercises,
            notes: self.notes,
            duration_secs: self.duration.and_then(|d| u64::try_from(d).ok()),
            body_weight: self.body_weight,
            progress_photo_url: self.progress_photo_url,
            progress_photo_data: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Row shape of the `user_profiles` table, keyed by `user_id`; goals and the
/// split are nested JSON columns.
#[derive(Debug, Serialize, Deserialize)]
struct ProfileRow {
    user_id: Uuid,
    name: String,
    email: String,
    #[serde(default)]
    bio: String,
    #[serde(default)]
    profile_image_url: Option<String>,
    #[serde(default)]
    body_weight_goal: Option<BodyWeightGoal>,
    #[serde(default)]
    goals: Vec<ExerciseGoal>,
    #[serde(default)]
    workout_split: Vec<WorkoutDay>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    updated_at: Option<OffsetDateTime>,
}

impl ProfileRow {
    fn from_profile(profile: &UserProfile, user_id: Uuid) -> Self {
        Self {
            user_id,
            name: profile.name.clone(),
            email: profile.email.clone(),
            bio: profile.bio.clone(),
            profile_image_url: profile.profile_image_url.clone(),
            body_weight_goal: profile.body_weight_goal.clone(),
            goals: profile.goals.clone(),
            workout_split: profile.workout_split.clone(),
            created_at: None,
            updated_at: Some(OffsetDateTime::now_utc()),
        }
    }

    fn into_profile(self) -> UserProfile {
        UserProfile {
            name: self.name,
            email: self.email,
            bio: self.bio,
            workout_split: self.workout_split,
            goals: self.goals,
            body_weight_goal: self.body_weight_goal,
            profile_image_url: self.profile_image_url,
        }
    }
}

#[async_trait]
impl RemoteGateway for SupabaseGateway {
    fn is_authenticated(&self) -> bool {
        self.session
            .read()
            .expect("session lock poisoned")
            .is_some()
    }

    fn current_user_id(&self) -> Option<Uuid> {
        self.session
            .read()
            .expect("session lock poisoned")
            .as_ref()
            .map(|s| s.user_id)
    }

    async fn fetch_workouts(&self) -> Result<Vec<Workout>, RemoteError> {
        let session = self.require_session()?;
        let resp = self
            .http
            .get(self.rest_url(WORKOUTS_TABLE))
            .headers(self.headers(&session)?)
            .query(&[
                ("user_id", format!("eq.{}", session.user_id)),
                ("order", "date.desc".to_string()),
                ("select", "*".to_string()),
            ])
            .send()
            .await?;
        let resp = check_status(resp).await?;

        // Decode row by row so one malformed record does not poison the batch.
        let rows: Vec<serde_json::Value> = resp.json().await?;
        let mut workouts = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<WorkoutRow>(row) {
                Ok(row) => workouts.push(row.into_workout()),
                Err(e) => warn!(error = %e, "skipping undecodable workout row"),
            }
        }
        Ok(workouts)
    }

    async fn upsert_workouts(&self, workouts: &[Workout]) -> Result<(), RemoteError> {
        let session = self.require_session()?;
        let rows: Vec<WorkoutRow> = workouts
            .iter()
            .map(|w| WorkoutRow::from_workout(w, session.user_id))
            .collect();

        let mut headers = self.headers(&session)?;
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );
        let resp = self
            .http
            .post(self.rest_url(WORKOUTS_TABLE))
            .headers(headers)
            .query(&[("on_conflict", "id")])
            .json(&rows)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn delete_workout(&self, workout_id: Uuid) -> Result<(), RemoteError> {
        let session = self.require_session()?;
        let resp = self
            .http
            .delete(self.rest_url(WORKOUTS_TABLE))
            .headers(self.headers(&session)?)
            .query(&[
                ("id", format!("eq.{}", workout_id)),
                ("user_id", format!("eq.{}", session.user_id)),
            ])
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn fetch_profile(&self) -> Result<Option<UserProfile>, RemoteError> {
        let session = self.require_session()?;
        let resp = self
            .http
            .get(self.rest_url(PROFILES_TABLE))
            .headers(self.headers(&session)?)
            .query(&[
                ("user_id", format!("eq.{}", session.user_id)),
                ("select", "*".to_string()),
            ])
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let mut rows: Vec<serde_json::Value> = resp.json().await?;
        if rows.is_empty() {
            return Ok(None);
        }
        match serde_json::from_value::<ProfileRow>(rows.remove(0)) {
            Ok(row) => Ok(Some(row.into_profile())),
            Err(e) => {
                warn!(error = %e, "skipping undecodable profile row");
                Ok(None)
            }
        }
    }

    async fn upsert_profile(&self, profile: &UserProfile) -> Result<(), RemoteError> {
        let session = self.require_session()?;
        let row = ProfileRow::from_profile(profile, session.user_id);

        let mut headers = self.headers(&session)?;
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );
        let resp = self
            .http
            .post(self.rest_url(PROFILES_TABLE))
            .headers(headers)
            .query(&[("on_conflict", "user_id")])
            .json(&row)
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn upload_binary(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
    ) -> Result<String, RemoteError> {
        self.upload(bucket, path, bytes).await
    }
}

#[cfg(test)]
mod row_tests {
    use super::*;
    use crate::workouts::model::{ExerciseEntry, WorkoutSet};
    use time::macros::datetime;

    #[test]
    fn workout_row_drops_inline_photo_data() {
        let mut workout = Workout::new("Progress Photo", datetime!(2024-04-01 08:00 UTC));
        workout.progress_photo_data = Some("aGVsbG8=".into());
        let user_id = Uuid::new_v4();

        let row = WorkoutRow::from_workout(&workout, user_id);
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("progress_photo_data").is_none());
        assert_eq!(json["user_id"], serde_json::json!(user_id));
    }

    #[test]
    fn workout_row_roundtrips_domain_fields() {
        let mut workout = Workout::new("Push Day", datetime!(2024-04-01 08:00 UTC));
        workout.exercises.push(ExerciseEntry::new(
            Uuid::new_v4(),
            "Bench",
            vec![WorkoutSet::new(5, 225.0)],
        ));
        workout.duration_secs = Some(3600);
        workout.body_weight = Some(198.5);

        let row = WorkoutRow::from_workout(&workout, Uuid::new_v4());
        let back = row.into_workout();
        assert_eq!(back.id, workout.id);
        assert_eq!(back.exercises, workout.exercises);
        assert_eq!(back.duration_secs, Some(3600));
        assert_eq!(back.body_weight, Some(198.5));
    }

    #[test]
    fn undecodable_rows_decode_individually() {
        let good = serde_json::json!({
            "id": Uuid::new_v4(),
            "user_id": Uuid::new_v4(),
            "date": "2024-01-01T09:00:00Z",
            "name": "Push Day",
            "exercises": [],
        });
        let bad = serde_json::json!({ "id": "not-a-uuid", "name": 42 });

        assert!(serde_json::from_value::<WorkoutRow>(good).is_ok());
        assert!(serde_json::from_value::<WorkoutRow>(bad).is_err());
    }
}
