// src/models/attempt.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an exam attempt.
///
/// `Timeout` is terminal and grades exactly like `Submitted`; it stays
/// distinguishable for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    NotStarted,
    InProgress,
    Submitted,
    Timeout,
    Graded,
}

impl AttemptStatus {
    /// Storage encoding, also used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::NotStarted => "not_started",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Timeout => "timeout",
            AttemptStatus::Graded => "graded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(AttemptStatus::NotStarted),
            "in_progress" => Some(AttemptStatus::InProgress),
            "submitted" => Some(AttemptStatus::Submitted),
            "timeout" => Some(AttemptStatus::Timeout),
            "graded" => Some(AttemptStatus::Graded),
            _ => None,
        }
    }

    /// Submitted, Timeout and Graded all mean "no more answering".
    pub fn is_finished(&self) -> bool {
        !matches!(self, AttemptStatus::NotStarted | AttemptStatus::InProgress)
    }
}

/// One student's run through one exam paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub user_id: i64,
    pub paper_id: i64,
    pub status: AttemptStatus,

    /// Set once at start, immutable thereafter.
    pub start_time: Option<DateTime<Utc>>,

    /// Hard deadline: start time plus the paper duration.
    pub end_time: Option<DateTime<Utc>>,

    /// Set exactly once, at submit or timeout.
    pub submit_time: Option<DateTime<Utc>>,

    /// Countdown state, monotonically non-increasing while in progress.
    pub remaining_seconds: i64,

    pub total_score: Decimal,
    pub objective_score: Decimal,
    pub subjective_score: Decimal,
    pub correct_count: i64,
    pub total_count: i64,
    pub is_passed: bool,

    pub created_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
}

impl Attempt {
    /// Fresh in-progress attempt; the repository assigns the id on insert.
    pub fn begin(
        user_id: i64,
        paper_id: i64,
        duration_seconds: i64,
        total_count: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            paper_id,
            status: AttemptStatus::InProgress,
            start_time: Some(now),
            end_time: Some(now + chrono::Duration::seconds(duration_seconds)),
            submit_time: None,
            remaining_seconds: duration_seconds,
            total_score: Decimal::ZERO,
            objective_score: Decimal::ZERO,
            subjective_score: Decimal::ZERO,
            correct_count: 0,
            total_count,
            is_passed: false,
            created_at: now,
            graded_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        let statuses = [
            AttemptStatus::NotStarted,
            AttemptStatus::InProgress,
            AttemptStatus::Submitted,
            AttemptStatus::Timeout,
            AttemptStatus::Graded,
        ];

        for status in statuses {
            assert_eq!(AttemptStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AttemptStatus::parse("nonsense"), None);
    }

    #[test]
    fn test_begin_sets_deadline() {
        let now = Utc::now();
        let attempt = Attempt::begin(1, 2, 5400, 10, now);

        assert_eq!(attempt.status, AttemptStatus::InProgress);
        assert_eq!(attempt.remaining_seconds, 5400);
        assert_eq!(attempt.start_time, Some(now));
        assert_eq!(attempt.end_time, Some(now + chrono::Duration::seconds(5400)));
        assert!(attempt.submit_time.is_none());
    }
}
