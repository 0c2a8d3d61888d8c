// src/config.rs

use std::env;

use dotenvy::dotenv;
use rust_decimal::Decimal;

/// How many countdown ticks pass between remaining-time flushes.
pub const DEFAULT_SYNC_CADENCE_TICKS: u32 = 30;

/// Subjective scores below this fraction of the max are flagged for the grader.
pub const DEFAULT_ANOMALY_THRESHOLD: &str = "0.3";

/// Fallback pass mark as a fraction of the paper total, used when the paper
/// does not carry an explicit pass score.
pub const DEFAULT_PASS_RATIO: &str = "0.6";

#[derive(Debug, Clone)]
pub struct Config {
    pub sync_cadence_ticks: u32,
    pub anomaly_threshold: Decimal,
    pub pass_ratio: Decimal,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let sync_cadence_ticks = env::var("EXAM_SYNC_CADENCE_TICKS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SYNC_CADENCE_TICKS);

        let anomaly_threshold = env::var("EXAM_ANOMALY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| DEFAULT_ANOMALY_THRESHOLD.parse().unwrap());

        let pass_ratio = env::var("EXAM_PASS_RATIO")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| DEFAULT_PASS_RATIO.parse().unwrap());

        Self {
            sync_cadence_ticks,
            anomaly_threshold,
            pass_ratio,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_cadence_ticks: DEFAULT_SYNC_CADENCE_TICKS,
            anomaly_threshold: DEFAULT_ANOMALY_THRESHOLD.parse().unwrap(),
            pass_ratio: DEFAULT_PASS_RATIO.parse().unwrap(),
        }
    }
}
