// src/store/eligibility.rs

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::EngineError;
use crate::store::{AttemptRepository, Eligibility, EligibilityChecker, PaperProvider};

/// Standard eligibility rule: the paper must be published, the clock must
/// be inside its exam window, and a finished earlier attempt blocks the
/// user unless the paper allows retakes.
///
/// The one-attempt-at-a-time rule is not checked here; the engine rejects
/// a duplicate start with `AlreadyInProgress` before consulting this.
pub struct PaperWindowEligibility {
    papers: Arc<dyn PaperProvider>,
    attempts: Arc<dyn AttemptRepository>,
}

impl PaperWindowEligibility {
    pub fn new(papers: Arc<dyn PaperProvider>, attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { papers, attempts }
    }
}

#[async_trait]
impl EligibilityChecker for PaperWindowEligibility {
    async fn check(&self, user_id: i64, paper_id: i64) -> Result<Eligibility, EngineError> {
        let Some(paper) = self.papers.paper(paper_id).await? else {
            return Ok(Eligibility::denied("paper does not exist"));
        };

        if !paper.published {
            return Ok(Eligibility::denied("paper is not published"));
        }

        let now = Utc::now();
        if let Some(opens) = paper.start_time {
            if now < opens {
                return Ok(Eligibility::denied("exam has not opened yet"));
            }
        }
        if let Some(closes) = paper.end_time {
            if now > closes {
                return Ok(Eligibility::denied("exam window has closed"));
            }
        }

        if let Some(previous) = self.attempts.find_latest(user_id, paper_id).await? {
            if previous.status.is_finished() && !paper.allow_retake {
                return Ok(Eligibility::denied("retake is not allowed for this paper"));
            }
        }

        Ok(Eligibility::allowed())
    }
}
