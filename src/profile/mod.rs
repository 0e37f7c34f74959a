pub mod model;
pub mod repo;

pub use model::{BodyWeightGoal, ExerciseGoal, UserProfile, WorkoutDay};
pub use repo::ProfileRepository;
