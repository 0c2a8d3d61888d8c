// src/store/memory.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::models::answer::Answer;
use crate::models::attempt::{Attempt, AttemptStatus};
use crate::models::paper::ExamPaper;
use crate::store::{
    AnswerStore, AttemptRepository, Eligibility, EligibilityChecker, PaperProvider,
};

/// In-memory attempt repository.
///
/// Backs the test suite and embedders that bring their own durable storage
/// elsewhere. Ids are assigned from a process-local counter.
#[derive(Default)]
pub struct MemoryAttemptRepository {
    rows: RwLock<HashMap<i64, Attempt>>,
    next_id: AtomicI64,
}

#[async_trait]
impl AttemptRepository for MemoryAttemptRepository {
    async fn insert(&self, mut attempt: Attempt) -> Result<Attempt, EngineError> {
        attempt.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.write().await.insert(attempt.id, attempt.clone());
        Ok(attempt)
    }

    async fn get(&self, attempt_id: i64) -> Result<Option<Attempt>, EngineError> {
        Ok(self.rows.read().await.get(&attempt_id).cloned())
    }

    async fn update(&self, attempt: &Attempt) -> Result<(), EngineError> {
        let mut rows = self.rows.write().await;
        if !rows.contains_key(&attempt.id) {
            return Err(EngineError::NotFound(format!("attempt {}", attempt.id)));
        }
        rows.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn find_in_progress(
        &self,
        user_id: i64,
        paper_id: i64,
    ) -> Result<Option<Attempt>, EngineError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|a| {
                a.user_id == user_id
                    && a.paper_id == paper_id
                    && a.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn find_latest(
        &self,
        user_id: i64,
        paper_id: i64,
    ) -> Result<Option<Attempt>, EngineError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id && a.paper_id == paper_id)
            .max_by_key(|a| a.id)
            .cloned())
    }
}

/// In-memory answer store; keeps each attempt's answers in creation order.
#[derive(Default)]
pub struct MemoryAnswerStore {
    rows: RwLock<HashMap<i64, Vec<Answer>>>,
}

#[async_trait]
impl AnswerStore for MemoryAnswerStore {
    async fn insert_all(&self, answers: &[Answer]) -> Result<(), EngineError> {
        let mut rows = self.rows.write().await;
        for answer in answers {
            rows.entry(answer.attempt_id)
                .or_default()
                .push(answer.clone());
        }
        Ok(())
    }

    async fn get(
        &self,
        attempt_id: i64,
        question_id: i64,
    ) -> Result<Option<Answer>, EngineError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&attempt_id)
            .and_then(|list| list.iter().find(|a| a.question_id == question_id))
            .cloned())
    }

    async fn list_for_attempt(&self, attempt_id: i64) -> Result<Vec<Answer>, EngineError> {
        Ok(self
            .rows
            .read()
            .await
            .get(&attempt_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update(&self, answer: &Answer) -> Result<(), EngineError> {
        let mut rows = self.rows.write().await;
        let list = rows.get_mut(&answer.attempt_id).ok_or_else(|| {
            EngineError::NotFound(format!("answers for attempt {}", answer.attempt_id))
        })?;
        let slot = list
            .iter_mut()
            .find(|a| a.question_id == answer.question_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "answer ({}, {})",
                    answer.attempt_id, answer.question_id
                ))
            })?;
        *slot = answer.clone();
        Ok(())
    }
}

/// In-memory paper catalog, seeded by the test or the embedder.
#[derive(Default)]
pub struct MemoryPaperProvider {
    papers: RwLock<HashMap<i64, ExamPaper>>,
}

impl MemoryPaperProvider {
    pub async fn insert(&self, paper: ExamPaper) {
        self.papers.write().await.insert(paper.id, paper);
    }
}

#[async_trait]
impl PaperProvider for MemoryPaperProvider {
    async fn paper(&self, paper_id: i64) -> Result<Option<ExamPaper>, EngineError> {
        Ok(self.papers.read().await.get(&paper_id).cloned())
    }
}

/// Eligibility checker that admits everyone.
pub struct AllowAll;

#[async_trait]
impl EligibilityChecker for AllowAll {
    async fn check(&self, _user_id: i64, _paper_id: i64) -> Result<Eligibility, EngineError> {
        Ok(Eligibility::allowed())
    }
}

/// Eligibility checker with a fixed verdict, for exercising rejections.
pub struct FixedEligibility(pub Eligibility);

#[async_trait]
impl EligibilityChecker for FixedEligibility {
    async fn check(&self, _user_id: i64, _paper_id: i64) -> Result<Eligibility, EngineError> {
        Ok(self.0.clone())
    }
}
