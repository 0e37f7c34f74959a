pub mod config;
pub mod debounce;
pub mod profile;
pub mod remote;
pub mod session;
pub mod state;
pub mod storage;
pub mod workouts;

pub use config::AppConfig;
pub use state::AppState;
