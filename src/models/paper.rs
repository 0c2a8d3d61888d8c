// src/models/paper.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Question type taxonomy.
///
/// The split into objective and subjective types is owned by the grader's
/// classification table, not by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TrueFalse,
    FillInBlank,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::FillInBlank => "fill_in_blank",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Essay => "essay",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single_choice" => Some(QuestionType::SingleChoice),
            "multiple_choice" => Some(QuestionType::MultipleChoice),
            "true_false" => Some(QuestionType::TrueFalse),
            "fill_in_blank" => Some(QuestionType::FillInBlank),
            "short_answer" => Some(QuestionType::ShortAnswer),
            "essay" => Some(QuestionType::Essay),
            _ => None,
        }
    }
}

/// One question as it appears on a paper: the identity, the answer key and
/// the points it is worth. Ordering within the paper is by `order_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperQuestion {
    pub question_id: i64,
    pub question_type: QuestionType,
    pub content: String,
    pub correct_answer: String,
    pub max_score: Decimal,
    pub order_index: i64,
}

/// Paper metadata as consumed by this engine.
///
/// Authoring owns papers; the engine only reads the duration, the question
/// list and the fields the eligibility rule needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamPaper {
    pub id: i64,
    pub name: String,
    pub duration_minutes: i64,
    pub total_score: Decimal,
    pub pass_score: Decimal,
    pub published: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub allow_retake: bool,

    /// Ordered by `order_index`.
    pub questions: Vec<PaperQuestion>,
}

impl ExamPaper {
    pub fn duration_seconds(&self) -> i64 {
        self.duration_minutes * 60
    }

    pub fn question(&self, question_id: i64) -> Option<&PaperQuestion> {
        self.questions.iter().find(|q| q.question_id == question_id)
    }
}
