use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::workouts::model::{ExerciseEntry, ExerciseTemplate, Workout};

/// One slot of the weekly split, e.g. "Push Day".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutDay {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub exercises: Vec<ExerciseTemplate>,
}

impl WorkoutDay {
    pub fn new(name: impl Into<String>, exercises: Vec<ExerciseTemplate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            exercises,
        }
    }

    /// Instantiates a concrete workout from this template: one entry per
    /// template exercise, sets decoded from the per-set target strings.
    pub fn instantiate_workout(&self, date: OffsetDateTime) -> Workout {
        let mut workout = Workout::new(self.name.clone(), date);
        workout.exercises = self
            .exercises
            .iter()
            .filter(|t| !t.name.trim().is_empty())
            .map(|t| ExerciseEntry::new(t.id, t.name.clone(), t.planned_sets()))
            .collect();
        workout
    }
}

/// Target for a single exercise; joins to workout history by display name,
/// not by a strong key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseGoal {
    pub id: Uuid,
    pub exercise_name: String,
    pub target_weight: f64,
    pub current_weight: f64,
}

impl ExerciseGoal {
    pub fn new(exercise_name: impl Into<String>, target_weight: f64, current_weight: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            exercise_name: exercise_name.into(),
            target_weight,
            current_weight,
        }
    }

    /// current/target as a percentage, clamped to [0, 100].
    pub fn progress_percentage(&self) -> f64 {
        if self.target_weight <= 0.0 {
            return 0.0;
        }
        ((self.current_weight / self.target_weight) * 100.0).clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyWeightGoal {
    pub target_weight: f64,
    pub current_weight: f64,
    pub starting_weight: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub target_date: OffsetDateTime,
}

impl BodyWeightGoal {
    /// Distance covered toward the target as a percentage of the total
    /// distance, capped at 100. Direction-aware: a target below the starting
    /// weight is a loss goal, otherwise a gain goal.
    pub fn progress_percentage(&self) -> f64 {
        let total_change = (self.target_weight - self.starting_weight).abs();
        if total_change <= 0.0 {
            return 0.0;
        }
        let current_change = if self.target_weight < self.starting_weight {
            (self.starting_weight - self.current_weight).abs()
        } else {
            (self.current_weight - self.starting_weight).abs()
        };
        ((current_change / total_change) * 100.0).min(100.0)
    }
}

/// The single per-user aggregate: personal info, the weekly split, and goals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub workout_split: Vec<WorkoutDay>,
    #[serde(default)]
    pub goals: Vec<ExerciseGoal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_weight_goal: Option<BodyWeightGoal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            bio: String::new(),
            workout_split: Vec::new(),
            goals: Vec::new(),
            body_weight_goal: None,
            profile_image_url: None,
        }
    }
}
