// src/state.rs

use std::sync::Arc;

use crate::config::Config;
use crate::store::{AnswerStore, AttemptRepository, EligibilityChecker, PaperProvider};

/// Shared handle to the storage collaborators and configuration.
///
/// Built once by the embedding application and cloned into the attempt
/// engine and every grading session.
#[derive(Clone)]
pub struct EngineState {
    pub attempts: Arc<dyn AttemptRepository>,
    pub answers: Arc<dyn AnswerStore>,
    pub papers: Arc<dyn PaperProvider>,
    pub eligibility: Arc<dyn EligibilityChecker>,
    pub config: Config,
}
