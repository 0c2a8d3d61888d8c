// src/store/mod.rs

pub mod eligibility;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::answer::Answer;
use crate::models::attempt::Attempt;
use crate::models::paper::ExamPaper;

/// Durable read/write of attempt records.
///
/// Implementations must provide per-row atomic read-modify-write; the
/// engine never needs cross-row transactions.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Persists a new attempt and returns it with the assigned id.
    async fn insert(&self, attempt: Attempt) -> Result<Attempt, EngineError>;

    async fn get(&self, attempt_id: i64) -> Result<Option<Attempt>, EngineError>;

    async fn update(&self, attempt: &Attempt) -> Result<(), EngineError>;

    /// The at-most-one InProgress attempt for this (user, paper) pair.
    async fn find_in_progress(
        &self,
        user_id: i64,
        paper_id: i64,
    ) -> Result<Option<Attempt>, EngineError>;

    /// Most recently created attempt for this (user, paper) pair, any state.
    async fn find_latest(
        &self,
        user_id: i64,
        paper_id: i64,
    ) -> Result<Option<Attempt>, EngineError>;
}

/// Durable read/write of one answer per (attempt, question).
#[async_trait]
pub trait AnswerStore: Send + Sync {
    /// Persists the attempt's answer placeholders, preserving order.
    async fn insert_all(&self, answers: &[Answer]) -> Result<(), EngineError>;

    async fn get(&self, attempt_id: i64, question_id: i64)
        -> Result<Option<Answer>, EngineError>;

    /// All answers of an attempt in creation (paper) order.
    async fn list_for_attempt(&self, attempt_id: i64) -> Result<Vec<Answer>, EngineError>;

    async fn update(&self, answer: &Answer) -> Result<(), EngineError>;
}

/// Read access to paper metadata and the ordered question list.
/// Papers are owned by the authoring side; this engine only reads them.
#[async_trait]
pub trait PaperProvider: Send + Sync {
    async fn paper(&self, paper_id: i64) -> Result<Option<ExamPaper>, EngineError>;
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone)]
pub struct Eligibility {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl Eligibility {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Decides whether a user may start an attempt on a paper.
/// Consulted once at start, after the in-progress check.
#[async_trait]
pub trait EligibilityChecker: Send + Sync {
    async fn check(&self, user_id: i64, paper_id: i64) -> Result<Eligibility, EngineError>;
}
