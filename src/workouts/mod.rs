pub mod model;
pub mod repo;

pub use model::{ExerciseEntry, ExerciseTemplate, Workout, WorkoutSet};
pub use repo::WorkoutRepository;
