// src/engine.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::EngineError;
use crate::grader;
use crate::models::answer::Answer;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::state::EngineState;

/// An attempt together with its answers, in paper question order.
#[derive(Debug, Clone)]
pub struct AttemptProgress {
    pub attempt: Attempt,
    pub answers: Vec<Answer>,
}

impl AttemptProgress {
    pub fn answered_count(&self) -> usize {
        self.answers
            .iter()
            .filter(|a| !a.user_answer.is_empty())
            .count()
    }
}

/// Drives one attempt through its lifecycle and mediates all answer writes
/// while the attempt is in progress.
///
/// Mutating operations are serialized per attempt id; operations on
/// different attempts never contend.
pub struct AttemptEngine {
    state: EngineState,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl AttemptEngine {
    pub fn new(state: EngineState) -> Self {
        Self {
            state,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    async fn lock_for(&self, attempt_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(attempt_id)
            .or_default()
            .clone()
    }

    async fn require(&self, attempt_id: i64) -> Result<Attempt, EngineError> {
        self.state
            .attempts
            .get(attempt_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("attempt {}", attempt_id)))
    }

    /// Starts a new attempt for (user, paper).
    ///
    /// Rejects with `AlreadyInProgress` when a live attempt exists for the
    /// pair, then defers to the eligibility collaborator. On success the
    /// attempt and one empty answer per paper question are persisted, in
    /// paper order.
    pub async fn start(&self, user_id: i64, paper_id: i64) -> Result<Attempt, EngineError> {
        if let Some(existing) = self
            .state
            .attempts
            .find_in_progress(user_id, paper_id)
            .await?
        {
            tracing::warn!(
                user_id,
                paper_id,
                attempt_id = existing.id,
                "start rejected, attempt already in progress"
            );
            return Err(EngineError::AlreadyInProgress { user_id, paper_id });
        }

        let verdict = self.state.eligibility.check(user_id, paper_id).await?;
        if !verdict.allowed {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "user may not take this exam".to_string());
            return Err(EngineError::Eligibility(reason));
        }

        let paper = self
            .state
            .papers
            .paper(paper_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("paper {}", paper_id)))?;

        let now = Utc::now();
        let attempt = Attempt::begin(
            user_id,
            paper_id,
            paper.duration_seconds(),
            paper.questions.len() as i64,
            now,
        );
        let attempt = self.state.attempts.insert(attempt).await?;

        let placeholders: Vec<Answer> = paper
            .questions
            .iter()
            .map(|q| Answer::placeholder(attempt.id, q.question_id))
            .collect();
        self.state.answers.insert_all(&placeholders).await?;

        tracing::info!(
            user_id,
            paper_id,
            attempt_id = attempt.id,
            questions = placeholders.len(),
            "exam attempt started"
        );
        Ok(attempt)
    }

    /// Overwrites the stored answer for one question, last write wins.
    ///
    /// The raw input is normalized per question type before storage.
    /// Saving an identical value is an observable no-op.
    pub async fn save_answer(
        &self,
        attempt_id: i64,
        question_id: i64,
        raw_answer: &str,
    ) -> Result<(), EngineError> {
        let lock = self.lock_for(attempt_id).await;
        let _guard = lock.lock().await;

        let attempt = self.require(attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(EngineError::InvalidState {
                attempt_id,
                status: attempt.status,
            });
        }

        let paper = self
            .state
            .papers
            .paper(attempt.paper_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("paper {}", attempt.paper_id)))?;
        let question = paper.question(question_id).ok_or_else(|| {
            EngineError::NotFound(format!(
                "question {} on paper {}",
                question_id, attempt.paper_id
            ))
        })?;

        let mut answer = self
            .state
            .answers
            .get(attempt_id, question_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("answer ({}, {})", attempt_id, question_id))
            })?;

        let normalized = grader::normalize_answer(question.question_type, raw_answer);
        if answer.user_answer == normalized {
            return Ok(());
        }

        answer.user_answer = normalized;
        answer.answer_time = Some(Utc::now());
        self.state.answers.update(&answer).await?;

        tracing::debug!(attempt_id, question_id, "answer saved");
        Ok(())
    }

    /// Persists the countdown's remaining seconds.
    ///
    /// Only a monotonic decrease is accepted; a stale or out-of-order value
    /// that would increase the countdown is ignored and reported as success,
    /// since this is a best-effort sync.
    pub async fn sync_remaining_time(
        &self,
        attempt_id: i64,
        seconds: i64,
    ) -> Result<(), EngineError> {
        let lock = self.lock_for(attempt_id).await;
        let _guard = lock.lock().await;

        let mut attempt = self.require(attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(EngineError::InvalidState {
                attempt_id,
                status: attempt.status,
            });
        }

        if seconds > attempt.remaining_seconds {
            tracing::warn!(
                attempt_id,
                seconds,
                current = attempt.remaining_seconds,
                "ignoring non-monotonic time sync"
            );
            return Ok(());
        }

        attempt.remaining_seconds = seconds.max(0);
        self.state.attempts.update(&attempt).await?;
        Ok(())
    }

    /// Finalizes the attempt as manually submitted and runs the objective
    /// grading pass durably before returning.
    ///
    /// A second concurrent call observes `InvalidState` instead of grading
    /// twice.
    pub async fn submit(&self, attempt_id: i64) -> Result<Attempt, EngineError> {
        self.finalize(attempt_id, AttemptStatus::Submitted).await
    }

    /// Timeout path driven by the countdown scheduler; identical to submit
    /// but lands on `Timeout`.
    pub(crate) async fn expire(&self, attempt_id: i64) -> Result<Attempt, EngineError> {
        self.finalize(attempt_id, AttemptStatus::Timeout).await
    }

    async fn finalize(
        &self,
        attempt_id: i64,
        final_status: AttemptStatus,
    ) -> Result<Attempt, EngineError> {
        let lock = self.lock_for(attempt_id).await;
        let _guard = lock.lock().await;

        let mut attempt = self.require(attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(EngineError::InvalidState {
                attempt_id,
                status: attempt.status,
            });
        }

        attempt.status = final_status;
        attempt.submit_time = Some(Utc::now());
        if final_status == AttemptStatus::Timeout {
            attempt.remaining_seconds = 0;
        }
        self.state.attempts.update(&attempt).await?;

        let attempt = grader::run_objective_pass(&self.state, attempt_id).await?;

        tracing::info!(
            attempt_id,
            status = final_status.as_str(),
            "exam attempt finalized"
        );
        Ok(attempt)
    }

    /// Pure read of the attempt and its answers, available in any state.
    pub async fn get_progress(&self, attempt_id: i64) -> Result<AttemptProgress, EngineError> {
        let attempt = self.require(attempt_id).await?;
        let answers = self.state.answers.list_for_attempt(attempt_id).await?;
        Ok(AttemptProgress { attempt, answers })
    }

    /// Re-entry after an interruption.
    ///
    /// When the wall-clock deadline has already passed, the attempt is
    /// finalized through the timeout path before progress is returned.
    pub async fn resume(&self, attempt_id: i64) -> Result<AttemptProgress, EngineError> {
        let attempt = self.require(attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            return Err(EngineError::InvalidState {
                attempt_id,
                status: attempt.status,
            });
        }

        let deadline_passed = attempt.end_time.is_some_and(|d| Utc::now() >= d);
        if deadline_passed {
            tracing::info!(attempt_id, "deadline passed while away, timing out");
            match self.expire(attempt_id).await {
                Ok(_) => {}
                // A countdown racing us to the deadline already finalized it.
                Err(EngineError::InvalidState { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        self.get_progress(attempt_id).await
    }
}
