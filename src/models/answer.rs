// src/models/answer.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One student's response to one question within one attempt.
///
/// Identity is the (attempt_id, question_id) pair. Rows are created empty
/// when the attempt starts and are never deleted while the attempt exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub attempt_id: i64,
    pub question_id: i64,

    /// Option labels for choice questions, free text otherwise.
    /// Empty string means unanswered; last write wins, no history kept.
    pub user_answer: String,

    /// None until graded.
    pub score: Option<Decimal>,

    pub is_graded: bool,

    /// Meaningful only for objective question types.
    pub is_correct: bool,

    pub comment: Option<String>,
    pub grader_id: Option<i64>,
    pub answer_time: Option<DateTime<Utc>>,
    pub grade_time: Option<DateTime<Utc>>,
}

impl Answer {
    /// Empty placeholder created at attempt start.
    pub fn placeholder(attempt_id: i64, question_id: i64) -> Self {
        Self {
            attempt_id,
            question_id,
            user_answer: String::new(),
            score: None,
            is_graded: false,
            is_correct: false,
            comment: None,
            grader_id: None,
            answer_time: None,
            grade_time: None,
        }
    }
}
