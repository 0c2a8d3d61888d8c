// src/grader.rs

use std::collections::BTreeSet;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::paper::QuestionType;
use crate::state::EngineState;

/// How a submitted answer is compared against the stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerRule {
    /// Single option label, case-insensitive exact match.
    ExactLabel,
    /// Comma-separated option labels compared as sets.
    LabelSet,
    /// "True"/"False", canonical after normalization.
    Boolean,
    /// Requires a human grader; never auto-graded.
    Manual,
}

/// The classification table. Adding a question type means extending this
/// match, nothing else.
///
/// Fill-in-blank is deliberately `Manual`: free text gets a human sanity
/// check even where exact matching would work.
pub fn rule_for(question_type: QuestionType) -> AnswerRule {
    match question_type {
        QuestionType::SingleChoice => AnswerRule::ExactLabel,
        QuestionType::MultipleChoice => AnswerRule::LabelSet,
        QuestionType::TrueFalse => AnswerRule::Boolean,
        QuestionType::FillInBlank | QuestionType::ShortAnswer | QuestionType::Essay => {
            AnswerRule::Manual
        }
    }
}

pub fn is_objective(question_type: QuestionType) -> bool {
    rule_for(question_type) != AnswerRule::Manual
}

fn label_set(s: &str) -> BTreeSet<String> {
    s.split(',')
        .map(|part| part.trim().to_ascii_uppercase())
        .filter(|part| !part.is_empty())
        .collect()
}

fn canonical_bool(s: &str) -> Option<&'static str> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some("True")
    } else if s.eq_ignore_ascii_case("false") {
        Some("False")
    } else {
        None
    }
}

/// Canonicalizes a raw answer for storage.
///
/// Choice labels are uppercased, multi-choice label lists are sorted and
/// deduplicated, booleans become "True"/"False". Free text is stored as
/// typed; unrecognized input is kept rather than rejected and will simply
/// grade incorrect.
pub fn normalize_answer(question_type: QuestionType, raw: &str) -> String {
    match rule_for(question_type) {
        AnswerRule::ExactLabel => raw.trim().to_ascii_uppercase(),
        AnswerRule::LabelSet => label_set(raw).into_iter().collect::<Vec<_>>().join(","),
        AnswerRule::Boolean => canonical_bool(raw)
            .map(str::to_string)
            .unwrap_or_else(|| raw.trim().to_string()),
        AnswerRule::Manual => raw.to_string(),
    }
}

/// Compares a submitted answer against the stored key.
///
/// Returns whether it is correct and the awarded score: full marks or zero,
/// no partial credit. Unrecognized or empty input grades incorrect, never
/// errors.
pub fn grade(
    question_type: QuestionType,
    correct_answer: &str,
    submitted_answer: &str,
    max_score: Decimal,
) -> (bool, Decimal) {
    let submitted = submitted_answer.trim();
    if submitted.is_empty() {
        return (false, Decimal::ZERO);
    }

    let is_correct = match rule_for(question_type) {
        AnswerRule::ExactLabel => submitted.eq_ignore_ascii_case(correct_answer.trim()),
        AnswerRule::LabelSet => {
            let key = label_set(correct_answer);
            !key.is_empty() && key == label_set(submitted)
        }
        AnswerRule::Boolean => match (canonical_bool(correct_answer), canonical_bool(submitted)) {
            (Some(key), Some(given)) => key == given,
            _ => false,
        },
        AnswerRule::Manual => false,
    };

    if is_correct {
        (true, max_score)
    } else {
        (false, Decimal::ZERO)
    }
}

/// Runs the objective grading pass over a finished attempt and refreshes
/// the score rollup.
///
/// Idempotent: already-graded answers are left untouched, so calling this
/// from both submit and a later grading session is safe. When every answer
/// is graded the attempt completes to `Graded` with the pass mark applied.
pub(crate) async fn run_objective_pass(
    state: &EngineState,
    attempt_id: i64,
) -> Result<Attempt, EngineError> {
    let mut attempt = state
        .attempts
        .get(attempt_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("attempt {}", attempt_id)))?;

    if !attempt.status.is_finished() {
        // A live attempt is never graded; submit runs this pass after the
        // status flip.
        tracing::debug!(attempt_id, "objective pass skipped, attempt still open");
        return Ok(attempt);
    }

    let paper = state
        .papers
        .paper(attempt.paper_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("paper {}", attempt.paper_id)))?;

    let mut answers = state.answers.list_for_attempt(attempt_id).await?;
    let now = Utc::now();

    for answer in answers.iter_mut() {
        let Some(question) = paper.question(answer.question_id) else {
            tracing::warn!(
                attempt_id,
                question_id = answer.question_id,
                "answer without a matching paper question, skipped"
            );
            continue;
        };

        if answer.is_graded || !is_objective(question.question_type) {
            continue;
        }

        let (is_correct, score) = grade(
            question.question_type,
            &question.correct_answer,
            &answer.user_answer,
            question.max_score,
        );

        answer.is_correct = is_correct;
        answer.score = Some(score);
        answer.is_graded = true;
        answer.grade_time = Some(now);
        state.answers.update(answer).await?;
    }

    // Rollup is recomputed from scratch each pass so re-runs converge.
    let mut objective_score = Decimal::ZERO;
    let mut subjective_score = Decimal::ZERO;
    let mut correct_count = 0_i64;
    let mut all_graded = true;

    for answer in &answers {
        let objective = paper
            .question(answer.question_id)
            .map(|q| is_objective(q.question_type))
            .unwrap_or(false);

        if !answer.is_graded {
            all_graded = false;
            continue;
        }

        let score = answer.score.unwrap_or(Decimal::ZERO);
        if objective {
            objective_score += score;
            if answer.is_correct {
                correct_count += 1;
            }
        } else {
            subjective_score += score;
        }
    }

    attempt.objective_score = objective_score;
    attempt.subjective_score = subjective_score;
    attempt.correct_count = correct_count;
    attempt.total_score = objective_score + subjective_score;

    if all_graded && attempt.status != AttemptStatus::Graded {
        let pass_score = if paper.pass_score > Decimal::ZERO {
            paper.pass_score
        } else {
            paper.total_score * state.config.pass_ratio
        };
        attempt.status = AttemptStatus::Graded;
        attempt.graded_at = Some(now);
        attempt.is_passed = attempt.total_score >= pass_score;
        tracing::info!(
            attempt_id,
            total_score = %attempt.total_score,
            is_passed = attempt.is_passed,
            "attempt fully graded"
        );
    }

    state.attempts.update(&attempt).await?;

    tracing::info!(
        attempt_id,
        objective_score = %objective_score,
        correct_count,
        "objective grading pass complete"
    );

    Ok(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_choice_case_insensitive() {
        let (correct, score) = grade(QuestionType::SingleChoice, "B", "b", Decimal::from(2));
        assert!(correct);
        assert_eq!(score, Decimal::from(2));
    }

    #[test]
    fn test_multiple_choice_order_insensitive() {
        let (correct, score) = grade(QuestionType::MultipleChoice, "A,C", "C,A", Decimal::from(5));
        assert!(correct);
        assert_eq!(score, Decimal::from(5));
    }

    #[test]
    fn test_multiple_choice_subset_is_wrong() {
        let (correct, score) = grade(QuestionType::MultipleChoice, "A,C", "A", Decimal::from(5));
        assert!(!correct);
        assert_eq!(score, Decimal::ZERO);
    }

    #[test]
    fn test_true_false_normalized() {
        let (correct, score) = grade(QuestionType::TrueFalse, "True", "true", Decimal::from(10));
        assert!(correct);
        assert_eq!(score, Decimal::from(10));
    }

    #[test]
    fn test_empty_answer_is_incorrect_not_error() {
        let (correct, score) = grade(QuestionType::SingleChoice, "A", "   ", Decimal::from(2));
        assert!(!correct);
        assert_eq!(score, Decimal::ZERO);
    }

    #[test]
    fn test_garbage_boolean_is_incorrect() {
        let (correct, _) = grade(QuestionType::TrueFalse, "True", "yep", Decimal::from(1));
        assert!(!correct);
    }

    #[test]
    fn test_manual_types_never_auto_grade() {
        for qt in [
            QuestionType::FillInBlank,
            QuestionType::ShortAnswer,
            QuestionType::Essay,
        ] {
            assert!(!is_objective(qt));
            let (correct, score) = grade(qt, "anything", "anything", Decimal::from(5));
            assert!(!correct);
            assert_eq!(score, Decimal::ZERO);
        }
    }

    #[test]
    fn test_normalize_multiple_choice_sorts_and_dedupes() {
        assert_eq!(
            normalize_answer(QuestionType::MultipleChoice, " c, a ,C"),
            "A,C"
        );
    }

    #[test]
    fn test_normalize_true_false_canonical() {
        assert_eq!(normalize_answer(QuestionType::TrueFalse, "FALSE"), "False");
        assert_eq!(normalize_answer(QuestionType::TrueFalse, "maybe"), "maybe");
    }

    #[test]
    fn test_normalize_free_text_verbatim() {
        assert_eq!(
            normalize_answer(QuestionType::Essay, "  spaced out  "),
            "  spaced out  "
        );
    }
}
