// src/error.rs

use std::fmt;

use rust_decimal::Decimal;

use crate::models::attempt::AttemptStatus;

/// Engine-wide error enum.
/// Centralizes error handling for the attempt lifecycle, grading and the
/// storage collaborators.
#[derive(Debug)]
pub enum EngineError {
    /// An InProgress attempt already exists for this (user, paper) pair.
    AlreadyInProgress { user_id: i64, paper_id: i64 },

    /// The eligibility collaborator rejected the user/paper pair.
    Eligibility(String),

    /// Operation attempted in a state that forbids it.
    InvalidState {
        attempt_id: i64,
        status: AttemptStatus,
    },

    /// A grading score fell outside [0, max_score] for its question.
    OutOfRange {
        question_id: i64,
        score: Decimal,
        max_score: Decimal,
    },

    /// Attempt, answer or paper row does not exist.
    NotFound(String),

    /// A storage collaborator failed.
    Persistence(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::AlreadyInProgress { user_id, paper_id } => write!(
                f,
                "user {} already has an exam in progress for paper {}",
                user_id, paper_id
            ),
            EngineError::Eligibility(msg) => write!(f, "not eligible: {}", msg),
            EngineError::InvalidState { attempt_id, status } => write!(
                f,
                "attempt {} is {}, operation not allowed",
                attempt_id,
                status.as_str()
            ),
            EngineError::OutOfRange {
                question_id,
                score,
                max_score,
            } => write!(
                f,
                "score {} for question {} is outside 0..={}",
                score, question_id, max_score
            ),
            EngineError::NotFound(msg) => write!(f, "not found: {}", msg),
            EngineError::Persistence(msg) => write!(f, "persistence failure: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Converts `sqlx::Error` into `EngineError::Persistence`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Persistence(err.to_string())
    }
}
