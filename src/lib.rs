// src/lib.rs

pub mod config;
pub mod countdown;
pub mod engine;
pub mod error;
pub mod grader;
pub mod grading;
pub mod models;
pub mod state;
pub mod store;

// Re-export the main entry points for convenience
pub use countdown::{CountdownHandle, CountdownScheduler};
pub use engine::{AttemptEngine, AttemptProgress};
pub use error::EngineError;
pub use grading::{GradingItem, GradingSession, RubricItem};
pub use state::EngineState;
