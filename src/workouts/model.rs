use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Reserved workout names for ancillary events. A record with one of these
/// names logs a body-weight update or a progress photo, not a training
/// session, and is skipped when picking a workout to resume.
pub const WEIGHT_UPDATE_NAME: &str = "Weight Update";
pub const PROGRESS_PHOTO_NAME: &str = "Progress Photo";

/// One performed set: reps at a weight (pounds by UI convention).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSet {
    pub id: Uuid,
    pub reps: u32,
    pub weight: f64,
}

impl WorkoutSet {
    pub fn new(reps: u32, weight: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            reps,
            weight,
        }
    }
}

/// One exercise inside a workout, linked back to the template it was
/// instantiated from so history can be grouped across workout days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseEntry {
    pub id: Uuid,
    pub template_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub sets: Vec<WorkoutSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Cached maximum weight across `sets`. Refreshed by the repository on
    /// every save; never treated as independent truth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_weight: Option<f64>,
}

impl ExerciseEntry {
    pub fn new(template_id: Uuid, name: impl Into<String>, sets: Vec<WorkoutSet>) -> Self {
        let mut entry = Self {
            id: Uuid::new_v4(),
            template_id,
            name: name.into(),
            sets,
            note: None,
            max_weight: None,
        };
        entry.recompute_max_weight();
        entry
    }

    pub fn recompute_max_weight(&mut self) {
        self.max_weight = self
            .sets
            .iter()
            .map(|s| s.weight)
            .fold(None, |acc: Option<f64>, w| {
                Some(acc.map_or(w, |m| m.max(w)))
            });
    }
}

/// A planned exercise inside a workout-day template. Per-set targets can be
/// encoded as comma-separated strings ("225, 225, 220" / "7, 6, 9") in
/// addition to the single default weight/reps scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTemplate {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps_string: Option<String>,
}

impl ExerciseTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            weight: None,
            reps: None,
            weight_string: None,
            reps_string: None,
        }
    }

    /// Decodes the comma-separated target strings into concrete sets. Columns
    /// are paired by position; an unparsable or missing value counts as 0, and
    /// a set exists wherever either column has text. Falls back to a single
    /// set from the scalar weight/reps when neither string yields anything.
    pub fn planned_sets(&self) -> Vec<WorkoutSet> {
        let weights: Vec<&str> = self
            .weight_string
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let reps: Vec<&str> = self
            .reps_string
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let count = weights.len().max(reps.len());
        let mut sets = Vec::with_capacity(count);
        for i in 0..count {
            let weight = weights.get(i).and_then(|w| w.parse().ok()).unwrap_or(0.0);
            let rep_count = reps.get(i).and_then(|r| r.parse().ok()).unwrap_or(0);
            sets.push(WorkoutSet::new(rep_count, weight));
        }

        if sets.is_empty() {
            if let (Some(weight), Some(rep_count)) = (self.weight, self.reps) {
                sets.push(WorkoutSet::new(rep_count, weight));
            }
        }
        sets
    }
}

/// One logged workout: a dated, named list of exercises plus optional
/// ancillary data (notes, duration, body weight, progress photo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<ExerciseEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_weight: Option<f64>,
    /// Authoritative photo reference once uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_photo_url: Option<String>,
    /// Base64 fallback held only in the local document while unauthenticated;
    /// migrated to a URL on the first authenticated reconcile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_photo_data: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<OffsetDateTime>,
}

impl Workout {
    pub fn new(name: impl Into<String>, date: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            name: name.into(),
            exercises: Vec::new(),
            notes: None,
            duration_secs: None,
            body_weight: None,
            progress_photo_url: None,
            progress_photo_data: None,
            created_at: Some(OffsetDateTime::now_utc()),
            updated_at: None,
        }
    }

    /// Calendar day this workout belongs to.
    pub fn day(&self) -> Date {
        self.date.date()
    }

    /// Ancillary events log a weight update or a progress photo and should
    /// not be resumed as the active workout.
    pub fn is_ancillary(&self) -> bool {
        self.name.contains(WEIGHT_UPDATE_NAME) || self.name.contains(PROGRESS_PHOTO_NAME)
    }

    pub fn refresh_max_weights(&mut self) {
        for exercise in &mut self.exercises {
            exercise.recompute_max_weight();
        }
    }

    /// Workouts logged on the given calendar day, for the calendar view.
    pub fn workouts_for_date(date: Date, workouts: &[Workout]) -> Vec<&Workout> {
        workouts.iter().filter(|w| w.day() == date).collect()
    }

    /// Days that have at least one workout, for calendar highlighting.
    pub fn dates_with_workouts(workouts: &[Workout]) -> HashSet<Date> {
        workouts.iter().map(Workout::day).collect()
    }
}
