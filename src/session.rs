use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::storage::LocalStore;
use crate::workouts::model::{ExerciseEntry, Workout, WorkoutSet};
use crate::workouts::repo::WorkoutRepository;

/// Cross-launch "resume where you left off" document: the selected
/// workout-day template plus a minimal projection of the in-progress workout.
/// Written on every backgrounding signal and every active-workout edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub selected_workout_day_name: Option<String>,
    pub current_workout: Option<WorkoutSnapshot>,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutSnapshot {
    pub workout_name: String,
    pub exercises: Vec<ExerciseSnapshot>,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    pub workout_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseSnapshot {
    pub id: String,
    pub name: String,
    pub sets: Vec<SetSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSnapshot {
    pub id: String,
    pub weight: f64,
    pub reps: u32,
}

impl WorkoutSnapshot {
    fn from_workout(workout: &Workout) -> Self {
        Self {
            workout_name: workout.name.clone(),
            exercises: workout
                .exercises
                .iter()
                .map(|e| ExerciseSnapshot {
                    id: e.id.to_string(),
                    name: e.name.clone(),
                    sets: e
                        .sets
                        .iter()
                        .map(|s| SetSnapshot {
                            id: s.id.to_string(),
                            weight: s.weight,
                            reps: s.reps,
                        })
                        .collect(),
                })
                .collect(),
            start_time: workout.date,
            workout_id: workout.id.to_string(),
        }
    }

    /// Rebuilds the full workout graph. Stored identity tokens are kept;
    /// a malformed one gets a fresh id.
    fn into_workout(self) -> Workout {
        let exercises = self
            .exercises
            .into_iter()
            .map(|e| {
                let id = parse_or_new(&e.id);
                let mut entry = ExerciseEntry {
                    id,
                    template_id: id,
                    name: e.name,
                    sets: e
                        .sets
                        .into_iter()
                        .map(|s| WorkoutSet {
                            id: parse_or_new(&s.id),
                            reps: s.reps,
                            weight: s.weight,
                        })
                        .collect(),
                    note: None,
                    max_weight: None,
                };
                entry.recompute_max_weight();
                entry
            })
            .collect();

        let mut workout = Workout::new(self.workout_name, self.start_time);
        workout.id = parse_or_new(&self.workout_id);
        workout.exercises = exercises;
        workout
    }
}

fn parse_or_new(id: &str) -> Uuid {
    Uuid::parse_str(id).unwrap_or_else(|_| Uuid::new_v4())
}

/// Persists and restores the active-session snapshot so the app survives
/// being terminated mid-workout.
pub struct SessionSnapshotManager {
    local: Arc<LocalStore>,
}

impl SessionSnapshotManager {
    pub fn new(local: Arc<LocalStore>) -> Self {
        Self { local }
    }

    /// Overwrites the snapshot with the current selection and active workout.
    pub async fn save_snapshot(
        &self,
        selected_workout_day: Option<&str>,
        active_workout: Option<&Workout>,
    ) -> anyhow::Result<()> {
        let snapshot = SessionSnapshot {
            selected_workout_day_name: selected_workout_day.map(Into::into),
            current_workout: active_workout.map(WorkoutSnapshot::from_workout),
            saved_at: OffsetDateTime::now_utc(),
        };
        self.local.write_snapshot(&snapshot).await
    }

    /// Reads the snapshot and, when a workout payload is present, installs it
    /// as the repository's active session (appending it to the collection if
    /// absent). Returns the selected workout-day name and whether an active
    /// workout was restored. Any decode problem reads as "no snapshot".
    pub async fn restore_snapshot(
        &self,
        workouts: &WorkoutRepository,
    ) -> (Option<String>, bool) {
        let Some(snapshot) = self.local.read_snapshot().await else {
            return (None, false);
        };
        let selected = snapshot.selected_workout_day_name;
        let Some(current) = snapshot.current_workout else {
            return (selected, false);
        };

        let workout = current.into_workout();
        debug!(workout_id = %workout.id, name = %workout.name, "restored session snapshot");
        workouts.install_active(workout).await;
        (selected, true)
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        self.local.clear_snapshot().await
    }
}
