//! Append-only log of evaluated configurations.

use bt_types::{EvaluationResult, HyperParameters};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a trial's configuration was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialOrigin {
    Initial,
    Acquired,
}

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// 1-based position in the search.
    pub trial_number: usize,
    pub params: HyperParameters,
    /// What the evaluator reported for `params`, learning curve included.
    pub result: EvaluationResult,
    pub origin: TrialOrigin,
    pub duration_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl TrialRecord {
    pub fn new(
        trial_number: usize,
        params: HyperParameters,
        result: EvaluationResult,
        origin: TrialOrigin,
        duration_ms: u64,
    ) -> Self {
        Self {
            trial_number,
            params,
            result,
            origin,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn score(&self) -> f64 {
        self.result.score
    }
}

/// Every trial of a search, in evaluation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResult {
    pub trials: Vec<TrialRecord>,
}

impl SearchResult {
    pub fn new() -> Self {
        Self { trials: Vec::new() }
    }

    pub fn push(&mut self, trial: TrialRecord) {
        self.trials.push(trial);
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Highest-scoring trial; the earliest one wins a tie.
    pub fn best(&self) -> Option<&TrialRecord> {
        self.trials.iter().fold(None, |best: Option<&TrialRecord>, trial| match best {
            _ if trial.score().is_nan() => best,
            Some(b) if trial.score() <= b.score() => Some(b),
            _ => Some(trial),
        })
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best().map(TrialRecord::score)
    }

    pub fn scores(&self) -> Vec<f64> {
        self.trials.iter().map(TrialRecord::score).collect()
    }

    /// Trials sorted by descending score, ties in trial order.
    pub fn leaderboard(&self) -> Vec<&TrialRecord> {
        let mut ranked: Vec<&TrialRecord> = self.trials.iter().collect();
        ranked.sort_by(|a, b| b.score().total_cmp(&a.score()));
        ranked
    }
}
