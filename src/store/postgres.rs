// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::error::EngineError;
use crate::models::answer::Answer;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::paper::{ExamPaper, PaperQuestion, QuestionType};
use crate::store::{AnswerStore, AttemptRepository, PaperProvider};

/// Applies the engine's schema (attempts, answers, papers, paper_questions).
/// A partial unique index enforces the one-InProgress-per-(user, paper)
/// invariant at the storage layer.
pub async fn run_migrations(pool: &PgPool) -> Result<(), EngineError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run engine migrations: {:?}", e);
            EngineError::Persistence(e.to_string())
        })
}

/// Helper struct for fetching attempt rows.
#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    paper_id: i64,
    status: String,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    submit_time: Option<DateTime<Utc>>,
    remaining_seconds: i64,
    total_score: Decimal,
    objective_score: Decimal,
    subjective_score: Decimal,
    correct_count: i64,
    total_count: i64,
    is_passed: bool,
    created_at: DateTime<Utc>,
    graded_at: Option<DateTime<Utc>>,
}

impl AttemptRow {
    fn into_attempt(self) -> Result<Attempt, EngineError> {
        let status = AttemptStatus::parse(&self.status).ok_or_else(|| {
            EngineError::Persistence(format!("unknown attempt status '{}'", self.status))
        })?;
        Ok(Attempt {
            id: self.id,
            user_id: self.user_id,
            paper_id: self.paper_id,
            status,
            start_time: self.start_time,
            end_time: self.end_time,
            submit_time: self.submit_time,
            remaining_seconds: self.remaining_seconds,
            total_score: self.total_score,
            objective_score: self.objective_score,
            subjective_score: self.subjective_score,
            correct_count: self.correct_count,
            total_count: self.total_count,
            is_passed: self.is_passed,
            created_at: self.created_at,
            graded_at: self.graded_at,
        })
    }
}

const ATTEMPT_COLUMNS: &str = "id, user_id, paper_id, status, start_time, end_time, submit_time, \
     remaining_seconds, total_score, objective_score, subjective_score, \
     correct_count, total_count, is_passed, created_at, graded_at";

pub struct PgAttemptRepository {
    pool: PgPool,
}

impl PgAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AttemptRepository for PgAttemptRepository {
    async fn insert(&self, mut attempt: Attempt) -> Result<Attempt, EngineError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO attempts
                (user_id, paper_id, status, start_time, end_time, submit_time,
                 remaining_seconds, total_score, objective_score, subjective_score,
                 correct_count, total_count, is_passed, created_at, graded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(attempt.user_id)
        .bind(attempt.paper_id)
        .bind(attempt.status.as_str())
        .bind(attempt.start_time)
        .bind(attempt.end_time)
        .bind(attempt.submit_time)
        .bind(attempt.remaining_seconds)
        .bind(attempt.total_score)
        .bind(attempt.objective_score)
        .bind(attempt.subjective_score)
        .bind(attempt.correct_count)
        .bind(attempt.total_count)
        .bind(attempt.is_passed)
        .bind(attempt.created_at)
        .bind(attempt.graded_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert attempt: {:?}", e);
            EngineError::from(e)
        })?;

        attempt.id = id;
        Ok(attempt)
    }

    async fn get(&self, attempt_id: i64) -> Result<Option<Attempt>, EngineError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM attempts WHERE id = $1",
            ATTEMPT_COLUMNS
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AttemptRow::into_attempt).transpose()
    }

    async fn update(&self, attempt: &Attempt) -> Result<(), EngineError> {
        let result = sqlx::query(
            r#"
            UPDATE attempts SET
                status = $2, start_time = $3, end_time = $4, submit_time = $5,
                remaining_seconds = $6, total_score = $7, objective_score = $8,
                subjective_score = $9, correct_count = $10, total_count = $11,
                is_passed = $12, graded_at = $13
            WHERE id = $1
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.status.as_str())
        .bind(attempt.start_time)
        .bind(attempt.end_time)
        .bind(attempt.submit_time)
        .bind(attempt.remaining_seconds)
        .bind(attempt.total_score)
        .bind(attempt.objective_score)
        .bind(attempt.subjective_score)
        .bind(attempt.correct_count)
        .bind(attempt.total_count)
        .bind(attempt.is_passed)
        .bind(attempt.graded_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!("attempt {}", attempt.id)));
        }
        Ok(())
    }

    async fn find_in_progress(
        &self,
        user_id: i64,
        paper_id: i64,
    ) -> Result<Option<Attempt>, EngineError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM attempts \
             WHERE user_id = $1 AND paper_id = $2 AND status = 'in_progress'",
            ATTEMPT_COLUMNS
        ))
        .bind(user_id)
        .bind(paper_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AttemptRow::into_attempt).transpose()
    }

    async fn find_latest(
        &self,
        user_id: i64,
        paper_id: i64,
    ) -> Result<Option<Attempt>, EngineError> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM attempts \
             WHERE user_id = $1 AND paper_id = $2 \
             ORDER BY created_at DESC, id DESC LIMIT 1",
            ATTEMPT_COLUMNS
        ))
        .bind(user_id)
        .bind(paper_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AttemptRow::into_attempt).transpose()
    }
}

/// Helper struct for fetching answer rows.
#[derive(sqlx::FromRow)]
struct AnswerRow {
    attempt_id: i64,
    question_id: i64,
    user_answer: String,
    score: Option<Decimal>,
    is_graded: bool,
    is_correct: bool,
    comment: Option<String>,
    grader_id: Option<i64>,
    answer_time: Option<DateTime<Utc>>,
    grade_time: Option<DateTime<Utc>>,
}

impl From<AnswerRow> for Answer {
    fn from(row: AnswerRow) -> Self {
        Answer {
            attempt_id: row.attempt_id,
            question_id: row.question_id,
            user_answer: row.user_answer,
            score: row.score,
            is_graded: row.is_graded,
            is_correct: row.is_correct,
            comment: row.comment,
            grader_id: row.grader_id,
            answer_time: row.answer_time,
            grade_time: row.grade_time,
        }
    }
}

const ANSWER_COLUMNS: &str = "attempt_id, question_id, user_answer, score, is_graded, \
     is_correct, comment, grader_id, answer_time, grade_time";

pub struct PgAnswerStore {
    pool: PgPool,
}

impl PgAnswerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnswerStore for PgAnswerStore {
    async fn insert_all(&self, answers: &[Answer]) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await?;

        for answer in answers {
            sqlx::query(
                r#"
                INSERT INTO answers
                    (attempt_id, question_id, user_answer, score, is_graded,
                     is_correct, comment, grader_id, answer_time, grade_time)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(answer.attempt_id)
            .bind(answer.question_id)
            .bind(&answer.user_answer)
            .bind(answer.score)
            .bind(answer.is_graded)
            .bind(answer.is_correct)
            .bind(&answer.comment)
            .bind(answer.grader_id)
            .bind(answer.answer_time)
            .bind(answer.grade_time)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!(
                    attempt_id = answer.attempt_id,
                    question_id = answer.question_id,
                    "Failed to insert answer placeholder: {:?}",
                    e
                );
                EngineError::from(e)
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(
        &self,
        attempt_id: i64,
        question_id: i64,
    ) -> Result<Option<Answer>, EngineError> {
        let row = sqlx::query_as::<_, AnswerRow>(&format!(
            "SELECT {} FROM answers WHERE attempt_id = $1 AND question_id = $2",
            ANSWER_COLUMNS
        ))
        .bind(attempt_id)
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Answer::from))
    }

    async fn list_for_attempt(&self, attempt_id: i64) -> Result<Vec<Answer>, EngineError> {
        let rows = sqlx::query_as::<_, AnswerRow>(&format!(
            "SELECT {} FROM answers WHERE attempt_id = $1 ORDER BY id",
            ANSWER_COLUMNS
        ))
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Answer::from).collect())
    }

    async fn update(&self, answer: &Answer) -> Result<(), EngineError> {
        let result = sqlx::query(
            r#"
            UPDATE answers SET
                user_answer = $3, score = $4, is_graded = $5, is_correct = $6,
                comment = $7, grader_id = $8, answer_time = $9, grade_time = $10
            WHERE attempt_id = $1 AND question_id = $2
            "#,
        )
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(&answer.user_answer)
        .bind(answer.score)
        .bind(answer.is_graded)
        .bind(answer.is_correct)
        .bind(&answer.comment)
        .bind(answer.grader_id)
        .bind(answer.answer_time)
        .bind(answer.grade_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EngineError::NotFound(format!(
                "answer ({}, {})",
                answer.attempt_id, answer.question_id
            )));
        }
        Ok(())
    }
}

/// Helper struct for fetching paper rows.
#[derive(sqlx::FromRow)]
struct PaperRow {
    id: i64,
    name: String,
    duration_minutes: i64,
    total_score: Decimal,
    pass_score: Decimal,
    published: bool,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    allow_retake: bool,
}

/// Helper struct for fetching paper question rows.
#[derive(sqlx::FromRow)]
struct PaperQuestionRow {
    question_id: i64,
    question_type: String,
    content: String,
    correct_answer: String,
    max_score: Decimal,
    order_index: i64,
}

impl PaperQuestionRow {
    fn into_question(self) -> Result<PaperQuestion, EngineError> {
        let question_type = QuestionType::parse(&self.question_type).ok_or_else(|| {
            EngineError::Persistence(format!("unknown question type '{}'", self.question_type))
        })?;
        Ok(PaperQuestion {
            question_id: self.question_id,
            question_type,
            content: self.content,
            correct_answer: self.correct_answer,
            max_score: self.max_score,
            order_index: self.order_index,
        })
    }
}

pub struct PgPaperProvider {
    pool: PgPool,
}

impl PgPaperProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaperProvider for PgPaperProvider {
    async fn paper(&self, paper_id: i64) -> Result<Option<ExamPaper>, EngineError> {
        let Some(row) = sqlx::query_as::<_, PaperRow>(
            "SELECT id, name, duration_minutes, total_score, pass_score, published, \
             start_time, end_time, allow_retake FROM papers WHERE id = $1",
        )
        .bind(paper_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let questions = sqlx::query_as::<_, PaperQuestionRow>(
            "SELECT question_id, question_type, content, correct_answer, max_score, order_index \
             FROM paper_questions WHERE paper_id = $1 ORDER BY order_index",
        )
        .bind(paper_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(PaperQuestionRow::into_question)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(ExamPaper {
            id: row.id,
            name: row.name,
            duration_minutes: row.duration_minutes,
            total_score: row.total_score,
            pass_score: row.pass_score,
            published: row.published,
            start_time: row.start_time,
            end_time: row.end_time,
            allow_retake: row.allow_retake,
            questions,
        }))
    }
}
