// src/grading.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::grader;
use crate::models::paper::QuestionType;
use crate::state::EngineState;

/// One named criterion a grader can score a subjective answer against.
/// Session-local only; the summed rubric becomes the answer's score.
#[derive(Debug, Clone)]
pub struct RubricItem {
    pub label: String,
    pub max_score: Decimal,
    score: Decimal,
}

impl RubricItem {
    pub fn new(label: impl Into<String>, max_score: Decimal) -> Self {
        Self {
            label: label.into(),
            max_score,
            score: Decimal::ZERO,
        }
    }

    /// Clamped into [0, max_score]; a rubric criterion can never go
    /// negative or above its weight.
    pub fn set_score(&mut self, score: Decimal) {
        self.score = score.clamp(Decimal::ZERO, self.max_score);
    }

    pub fn score(&self) -> Decimal {
        self.score
    }
}

/// One subjective answer as presented to a human grader.
#[derive(Debug, Clone)]
pub struct GradingItem {
    pub question_id: i64,
    pub question_type: QuestionType,
    pub content: String,
    pub standard_answer: String,
    pub user_answer: String,
    pub max_score: Decimal,
    pub score: Option<Decimal>,
    pub comment: Option<String>,
    pub is_graded: bool,
    pub grader_id: Option<i64>,
    pub grade_time: Option<DateTime<Utc>>,

    /// Ungraded, or scored suspiciously low; highlighted for attention.
    pub is_anomaly: bool,
}

#[derive(Debug, Clone)]
struct ScoreEdit {
    score: Decimal,
    comment: Option<String>,
}

/// Ungraded answers and low scores both want a second look from the grader.
/// A score exactly at the threshold is not anomalous.
fn is_anomalous(
    is_graded: bool,
    score: Option<Decimal>,
    max_score: Decimal,
    threshold: Decimal,
) -> bool {
    if !is_graded {
        return true;
    }
    score.unwrap_or(Decimal::ZERO) < max_score * threshold
}

/// A human grader's pass over one attempt's subjective answers.
///
/// Loading re-runs the objective grading pass first, so the session always
/// opens against up-to-date objective results. Scores can be saved one at
/// a time or staged and committed as an all-or-nothing batch.
pub struct GradingSession {
    state: EngineState,
    attempt_id: i64,
    grader_id: i64,
    items: Vec<GradingItem>,
    edits: HashMap<i64, ScoreEdit>,
}

impl GradingSession {
    /// Opens a grading session over the attempt's subjective answers.
    pub async fn load(
        state: EngineState,
        attempt_id: i64,
        grader_id: i64,
    ) -> Result<Self, EngineError> {
        // Objective results must be current before the human pass; the
        // pass is idempotent so re-entering a session is safe.
        let attempt = grader::run_objective_pass(&state, attempt_id).await?;

        let paper = state
            .papers
            .paper(attempt.paper_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("paper {}", attempt.paper_id)))?;
        let answers = state.answers.list_for_attempt(attempt_id).await?;
        let threshold = state.config.anomaly_threshold;

        let mut items = Vec::new();
        for answer in answers {
            let Some(question) = paper.question(answer.question_id) else {
                tracing::warn!(
                    attempt_id,
                    question_id = answer.question_id,
                    "answer without a matching paper question, not shown to grader"
                );
                continue;
            };
            if grader::is_objective(question.question_type) {
                continue;
            }

            let is_anomaly =
                is_anomalous(answer.is_graded, answer.score, question.max_score, threshold);
            items.push(GradingItem {
                question_id: answer.question_id,
                question_type: question.question_type,
                content: question.content.clone(),
                standard_answer: question.correct_answer.clone(),
                user_answer: answer.user_answer,
                max_score: question.max_score,
                score: answer.score,
                comment: answer.comment,
                is_graded: answer.is_graded,
                grader_id: answer.grader_id,
                grade_time: answer.grade_time,
                is_anomaly,
            });
        }

        tracing::info!(
            attempt_id,
            grader_id,
            subjective = items.len(),
            ungraded = items.iter().filter(|i| !i.is_graded).count(),
            "grading session loaded"
        );

        Ok(Self {
            state,
            attempt_id,
            grader_id,
            items,
            edits: HashMap::new(),
        })
    }

    pub fn attempt_id(&self) -> i64 {
        self.attempt_id
    }

    /// Every subjective item, graded or not, in paper order.
    pub fn items(&self) -> &[GradingItem] {
        &self.items
    }

    /// The "only ungraded" view is a pure filter over the loaded set.
    pub fn ungraded(&self) -> impl Iterator<Item = &GradingItem> {
        self.items.iter().filter(|item| !item.is_graded)
    }

    pub fn ungraded_count(&self) -> usize {
        self.ungraded().count()
    }

    fn item_index(&self, question_id: i64) -> Result<usize, EngineError> {
        self.items
            .iter()
            .position(|item| item.question_id == question_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "subjective question {} on attempt {}",
                    question_id, self.attempt_id
                ))
            })
    }

    fn check_range(&self, question_id: i64, score: Decimal) -> Result<usize, EngineError> {
        let idx = self.item_index(question_id)?;
        let max_score = self.items[idx].max_score;
        if score < Decimal::ZERO || score > max_score {
            return Err(EngineError::OutOfRange {
                question_id,
                score,
                max_score,
            });
        }
        Ok(idx)
    }

    /// Validates and immediately persists one score.
    pub async fn set_score(
        &mut self,
        question_id: i64,
        score: Decimal,
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        let idx = self.check_range(question_id, score)?;
        self.persist(idx, score, comment).await?;
        self.refresh_rollup().await
    }

    /// Sums a clamped rubric into the answer's score.
    pub async fn set_score_from_rubric(
        &mut self,
        question_id: i64,
        rubric: &[RubricItem],
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        let total = rubric.iter().map(RubricItem::score).sum();
        self.set_score(question_id, total, comment).await
    }

    /// Holds a score edit in memory for a later `commit_all`.
    pub fn stage_score(&mut self, question_id: i64, score: Decimal, comment: Option<String>) {
        self.edits.insert(question_id, ScoreEdit { score, comment });
    }

    /// Applies every staged edit as one logical batch.
    ///
    /// All edits are validated before any write; the first out-of-range
    /// score aborts the whole batch so a concurrent viewer never sees a
    /// partially applied grading pass.
    pub async fn commit_all(&mut self) -> Result<(), EngineError> {
        let mut planned = Vec::with_capacity(self.edits.len());
        for item in &self.items {
            if let Some(edit) = self.edits.get(&item.question_id) {
                if edit.score < Decimal::ZERO || edit.score > item.max_score {
                    return Err(EngineError::OutOfRange {
                        question_id: item.question_id,
                        score: edit.score,
                        max_score: item.max_score,
                    });
                }
                planned.push(item.question_id);
            }
        }
        // A staged edit for a question that is not a subjective item on
        // this attempt also aborts before any write.
        for question_id in self.edits.keys() {
            self.item_index(*question_id)?;
        }

        for question_id in planned {
            let edit = self.edits[&question_id].clone();
            let idx = self.item_index(question_id)?;
            self.persist(idx, edit.score, edit.comment).await?;
        }
        self.edits.clear();

        self.refresh_rollup().await
    }

    async fn persist(
        &mut self,
        idx: usize,
        score: Decimal,
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        let question_id = self.items[idx].question_id;
        let mut answer = self
            .state
            .answers
            .get(self.attempt_id, question_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("answer ({}, {})", self.attempt_id, question_id))
            })?;

        let now = Utc::now();
        answer.score = Some(score);
        answer.comment = comment.clone();
        answer.grader_id = Some(self.grader_id);
        answer.grade_time = Some(now);
        answer.is_graded = true;
        self.state.answers.update(&answer).await?;

        let threshold = self.state.config.anomaly_threshold;
        let item = &mut self.items[idx];
        item.score = Some(score);
        item.comment = comment;
        item.grader_id = Some(self.grader_id);
        item.grade_time = Some(now);
        item.is_graded = true;
        item.is_anomaly = is_anomalous(true, Some(score), item.max_score, threshold);

        tracing::info!(
            attempt_id = self.attempt_id,
            question_id,
            score = %score,
            grader_id = self.grader_id,
            "subjective score saved"
        );
        Ok(())
    }

    /// Refreshes the attempt's score rollup; completes the attempt to
    /// Graded once every answer has a score.
    async fn refresh_rollup(&self) -> Result<(), EngineError> {
        grader::run_objective_pass(&self.state, self.attempt_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_rubric_clamps_to_bounds() {
        let mut item = RubricItem::new("structure", dec("4"));
        item.set_score(dec("5.5"));
        assert_eq!(item.score(), dec("4"));
        item.set_score(dec("-1"));
        assert_eq!(item.score(), Decimal::ZERO);
        item.set_score(dec("2.5"));
        assert_eq!(item.score(), dec("2.5"));
    }

    #[test]
    fn test_ungraded_is_anomalous() {
        assert!(is_anomalous(false, None, dec("10"), dec("0.3")));
    }

    #[test]
    fn test_low_score_is_anomalous() {
        // 2 < 0.3 * 10
        assert!(is_anomalous(true, Some(dec("2")), dec("10"), dec("0.3")));
    }

    #[test]
    fn test_threshold_boundary_is_not_anomalous() {
        // 3 is exactly 0.3 * 10; the boundary is non-strict.
        assert!(!is_anomalous(true, Some(dec("3")), dec("10"), dec("0.3")));
    }

    #[test]
    fn test_zero_score_is_anomalous() {
        assert!(is_anomalous(true, Some(Decimal::ZERO), dec("10"), dec("0.3")));
    }
}
