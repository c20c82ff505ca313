use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Points available to the date proximity sub-score.
pub const DATE_WEIGHT: f64 = 30.0;
/// Points available to the location similarity sub-score.
pub const LOCATION_WEIGHT: f64 = 40.0;
/// Points available to the attribute overlap sub-score.
pub const ATTRIBUTE_WEIGHT: f64 = 30.0;

/// Days over which the date sub-score decays linearly to zero.
pub const DATE_WINDOW_DAYS: f64 = 30.0;
/// A found date may precede the last-seen date by this many days.
pub const DATE_SLACK_DAYS: i64 = 1;

pub const DEFAULT_MIN_MATCH_THRESHOLD: u8 = 40;
pub const DEFAULT_NOTIFY_THRESHOLD: u8 = 70;

/// How a report mutation reaches the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchDispatch {
    /// Publish a job to the queue, picked up by a worker.
    Queue,
    /// Run the pass on a background task inside the API process.
    Inline,
}

impl MatchDispatch {
    pub fn from_env_value(value: &str) -> Option<Self> {
        match value {
            "queue" => Some(Self::Queue),
            "inline" => Some(Self::Inline),
            _ => None,
        }
    }
}

/// Thresholds and I/O limits for matching passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchThresholds {
    /// Scores below this never create a match, and dismiss an existing one.
    pub min_match: u8,
    /// Scores at or above this notify both report owners once.
    pub notify: u8,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            min_match: DEFAULT_MIN_MATCH_THRESHOLD,
            notify: DEFAULT_NOTIFY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    pub thresholds: MatchThresholds,
    pub io_timeout_seconds: u64,
    pub dispatch: MatchDispatch,
    pub reconcile_interval_seconds: u64,
    pub reconcile_concurrency: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            thresholds: MatchThresholds::default(),
            io_timeout_seconds: 5,
            dispatch: MatchDispatch::Queue,
            reconcile_interval_seconds: 3600,
            reconcile_concurrency: 4,
        }
    }
}

impl MatchingConfig {
    /// Reject settings the matcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        let thresholds = self.thresholds;
        if thresholds.min_match > 100 || thresholds.notify > 100 {
            return Err(anyhow!("match thresholds must be between 0 and 100"));
        }
        if thresholds.notify < thresholds.min_match {
            return Err(anyhow!(
                "MATCH_NOTIFY_THRESHOLD must not be lower than MATCH_MIN_THRESHOLD"
            ));
        }
        if self.io_timeout_seconds == 0 {
            return Err(anyhow!("MATCH_IO_TIMEOUT_SECONDS must be at least 1"));
        }
        if self.reconcile_interval_seconds == 0 {
            return Err(anyhow!("RECONCILE_INTERVAL_SECONDS must be at least 1"));
        }
        if self.reconcile_concurrency == 0 {
            return Err(anyhow!("RECONCILE_CONCURRENCY must be at least 1"));
        }
        Ok(())
    }
}
