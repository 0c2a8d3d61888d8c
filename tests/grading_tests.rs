// tests/grading_tests.rs

use std::sync::Arc;

use chrono::Utc;
use exam_engine::config::Config;
use exam_engine::models::answer::Answer;
use exam_engine::models::attempt::{Attempt, AttemptStatus};
use exam_engine::models::paper::{ExamPaper, PaperQuestion, QuestionType};
use exam_engine::store::memory::{
    AllowAll, MemoryAnswerStore, MemoryAttemptRepository, MemoryPaperProvider,
};
use exam_engine::store::{AnswerStore, AttemptRepository};
use exam_engine::{AttemptEngine, EngineError, EngineState, GradingSession, RubricItem};
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn question(
    question_id: i64,
    question_type: QuestionType,
    correct_answer: &str,
    max_score: &str,
    order_index: i64,
) -> PaperQuestion {
    PaperQuestion {
        question_id,
        question_type,
        content: format!("Question {}", question_id),
        correct_answer: correct_answer.to_string(),
        max_score: dec(max_score),
        order_index,
    }
}

/// Same shape as the engine suite's paper: 17 objective points, 30
/// subjective (short answer worth 10, essay worth 20), pass mark 28.
fn geography_paper(id: i64) -> ExamPaper {
    ExamPaper {
        id,
        name: "Geography midterm".to_string(),
        duration_minutes: 90,
        total_score: dec("47"),
        pass_score: dec("28"),
        published: true,
        start_time: None,
        end_time: None,
        allow_retake: false,
        questions: vec![
            question(11, QuestionType::SingleChoice, "B", "2", 0),
            question(12, QuestionType::MultipleChoice, "A,C", "5", 1),
            question(13, QuestionType::TrueFalse, "True", "10", 2),
            question(14, QuestionType::ShortAnswer, "plate tectonics", "10", 3),
            question(15, QuestionType::Essay, "", "20", 4),
        ],
    }
}

struct TestBackend {
    attempts: Arc<MemoryAttemptRepository>,
    answers: Arc<MemoryAnswerStore>,
    state: EngineState,
}

async fn backend_with(paper: ExamPaper) -> TestBackend {
    let attempts = Arc::new(MemoryAttemptRepository::default());
    let answers = Arc::new(MemoryAnswerStore::default());
    let papers = Arc::new(MemoryPaperProvider::default());
    papers.insert(paper).await;

    let state = EngineState {
        attempts: attempts.clone(),
        answers: answers.clone(),
        papers,
        eligibility: Arc::new(AllowAll),
        config: Config::default(),
    };

    TestBackend {
        attempts,
        answers,
        state,
    }
}

/// Runs a full attempt through the engine: all answers saved (objective
/// ones correct), then submitted, so the objective pass has already run.
async fn submitted_attempt(backend: &TestBackend) -> i64 {
    let engine = AttemptEngine::new(backend.state.clone());
    let attempt = engine.start(100, 1).await.unwrap();
    engine.save_answer(attempt.id, 11, "B").await.unwrap();
    engine.save_answer(attempt.id, 12, "A,C").await.unwrap();
    engine.save_answer(attempt.id, 13, "True").await.unwrap();
    engine
        .save_answer(attempt.id, 14, "mantle convection")
        .await
        .unwrap();
    engine
        .save_answer(attempt.id, 15, "a long essay about plates")
        .await
        .unwrap();
    engine.submit(attempt.id).await.unwrap();
    attempt.id
}

#[tokio::test]
async fn load_backfills_objective_grades_that_submit_skipped() {
    // Arrange: a submitted attempt whose objective answers were somehow
    // never auto-graded (rows written directly, bypassing the engine)
    let backend = backend_with(geography_paper(1)).await;
    let mut attempt = Attempt::begin(100, 1, 5400, 5, Utc::now());
    attempt.status = AttemptStatus::Submitted;
    attempt.submit_time = Some(Utc::now());
    let attempt = backend.attempts.insert(attempt).await.unwrap();

    let mut answers: Vec<Answer> = [11, 12, 13, 14, 15]
        .iter()
        .map(|qid| Answer::placeholder(attempt.id, *qid))
        .collect();
    answers[0].user_answer = "B".to_string();
    answers[1].user_answer = "A,C".to_string();
    answers[2].user_answer = "False".to_string();
    answers[3].user_answer = "mantle convection".to_string();
    backend.answers.insert_all(&answers).await.unwrap();

    // Act
    let session = GradingSession::load(backend.state.clone(), attempt.id, 9)
        .await
        .unwrap();

    // Assert: the pass caught up on the objective answers
    for qid in [11_i64, 12, 13] {
        let stored = backend.answers.get(attempt.id, qid).await.unwrap().unwrap();
        assert!(stored.is_graded, "objective answer {} must be graded", qid);
    }
    let wrong = backend.answers.get(attempt.id, 13).await.unwrap().unwrap();
    assert!(!wrong.is_correct);
    assert_eq!(wrong.score, Some(Decimal::ZERO));

    // Only the two subjective questions face the grader, both flagged
    let ids: Vec<i64> = session.items().iter().map(|i| i.question_id).collect();
    assert_eq!(ids, vec![14, 15]);
    assert!(session.items().iter().all(|i| i.is_anomaly));
    assert_eq!(session.ungraded_count(), 2);
}

#[tokio::test]
async fn set_score_out_of_range_leaves_answer_untouched() {
    // Arrange
    let backend = backend_with(geography_paper(1)).await;
    let attempt_id = submitted_attempt(&backend).await;
    let mut session = GradingSession::load(backend.state.clone(), attempt_id, 9)
        .await
        .unwrap();

    // Act: one cent over the maximum
    let result = session.set_score(14, dec("10.01"), None).await;

    // Assert
    assert!(matches!(
        result,
        Err(EngineError::OutOfRange {
            question_id: 14,
            ..
        })
    ));
    let stored = backend.answers.get(attempt_id, 14).await.unwrap().unwrap();
    assert!(!stored.is_graded);
    assert!(stored.score.is_none());

    // Negative scores are rejected the same way
    let result = session.set_score(14, dec("-0.5"), None).await;
    assert!(matches!(result, Err(EngineError::OutOfRange { .. })));
}

#[tokio::test]
async fn set_score_writes_grading_fields() {
    // Arrange
    let backend = backend_with(geography_paper(1)).await;
    let attempt_id = submitted_attempt(&backend).await;
    let mut session = GradingSession::load(backend.state.clone(), attempt_id, 9)
        .await
        .unwrap();

    // Act
    session
        .set_score(14, dec("7.5"), Some("solid reasoning".to_string()))
        .await
        .unwrap();

    // Assert
    let stored = backend.answers.get(attempt_id, 14).await.unwrap().unwrap();
    assert!(stored.is_graded);
    assert_eq!(stored.score, Some(dec("7.5")));
    assert_eq!(stored.comment.as_deref(), Some("solid reasoning"));
    assert_eq!(stored.grader_id, Some(9));
    assert!(stored.grade_time.is_some());

    let item = session
        .items()
        .iter()
        .find(|i| i.question_id == 14)
        .unwrap();
    assert!(!item.is_anomaly, "7.5 of 10 is well above the threshold");
    assert_eq!(session.ungraded_count(), 1);
}

#[tokio::test]
async fn anomaly_flag_follows_the_threshold_boundary() {
    // Arrange
    let backend = backend_with(geography_paper(1)).await;
    let attempt_id = submitted_attempt(&backend).await;
    let mut session = GradingSession::load(backend.state.clone(), attempt_id, 9)
        .await
        .unwrap();

    // Act: 2 of 10 is below 30%
    session.set_score(14, dec("2"), None).await.unwrap();
    let flagged = session
        .items()
        .iter()
        .find(|i| i.question_id == 14)
        .unwrap()
        .is_anomaly;

    // Re-grade at exactly the threshold
    session.set_score(14, dec("3"), None).await.unwrap();
    let at_boundary = session
        .items()
        .iter()
        .find(|i| i.question_id == 14)
        .unwrap()
        .is_anomaly;

    // Assert
    assert!(flagged, "2 < 0.3 * 10 must be flagged");
    assert!(!at_boundary, "3 == 0.3 * 10 must not be flagged");
}

#[tokio::test]
async fn commit_all_is_all_or_nothing() {
    // Arrange
    let backend = backend_with(geography_paper(1)).await;
    let attempt_id = submitted_attempt(&backend).await;
    let mut session = GradingSession::load(backend.state.clone(), attempt_id, 9)
        .await
        .unwrap();

    // Act: one valid edit, one out of range
    session.stage_score(14, dec("8"), None);
    session.stage_score(15, dec("25"), None);
    let result = session.commit_all().await;

    // Assert: the batch aborted before any write
    assert!(matches!(
        result,
        Err(EngineError::OutOfRange {
            question_id: 15,
            ..
        })
    ));
    for qid in [14_i64, 15] {
        let stored = backend.answers.get(attempt_id, qid).await.unwrap().unwrap();
        assert!(!stored.is_graded, "answer {} must be untouched", qid);
    }

    // Act: fix the bad edit and commit again
    session.stage_score(15, dec("18"), Some("thorough".to_string()));
    session.commit_all().await.unwrap();

    // Assert: both edits landed and the attempt completed grading
    let short_answer = backend.answers.get(attempt_id, 14).await.unwrap().unwrap();
    let essay = backend.answers.get(attempt_id, 15).await.unwrap().unwrap();
    assert_eq!(short_answer.score, Some(dec("8")));
    assert_eq!(essay.score, Some(dec("18")));

    let attempt = backend.attempts.get(attempt_id).await.unwrap().unwrap();
    assert_eq!(attempt.status, AttemptStatus::Graded);
    assert!(attempt.graded_at.is_some());
    // 17 objective + 8 + 18 subjective
    assert_eq!(attempt.total_score, dec("43"));
    assert_eq!(attempt.subjective_score, dec("26"));
    assert!(attempt.is_passed, "43 >= pass mark of 28");
}

#[tokio::test]
async fn rubric_totals_feed_the_score() {
    // Arrange
    let backend = backend_with(geography_paper(1)).await;
    let attempt_id = submitted_attempt(&backend).await;
    let mut session = GradingSession::load(backend.state.clone(), attempt_id, 9)
        .await
        .unwrap();

    let mut accuracy = RubricItem::new("accuracy", dec("4"));
    let mut depth = RubricItem::new("depth", dec("6"));
    // Over-max entry clamps to the criterion's weight
    accuracy.set_score(dec("9"));
    depth.set_score(dec("2.5"));

    // Act
    session
        .set_score_from_rubric(14, &[accuracy, depth], None)
        .await
        .unwrap();

    // Assert: 4 (clamped) + 2.5
    let stored = backend.answers.get(attempt_id, 14).await.unwrap().unwrap();
    assert_eq!(stored.score, Some(dec("6.5")));
    assert!(stored.is_graded);
}

#[tokio::test]
async fn grading_an_objective_question_is_not_found() {
    // Arrange
    let backend = backend_with(geography_paper(1)).await;
    let attempt_id = submitted_attempt(&backend).await;
    let mut session = GradingSession::load(backend.state.clone(), attempt_id, 9)
        .await
        .unwrap();

    // Act: question 11 is single-choice and never faces the grader
    let result = session.set_score(11, dec("1"), None).await;

    // Assert
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}
