use serde::{Deserialize, Serialize};

use crate::errors::BtResult;
use crate::params::HyperParameters;

/// Cross-validated metric for one boosting round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundMetric {
    /// 1-based boosting round.
    pub round: usize,
    /// Metric averaged across folds.
    pub mean: f64,
    /// Standard deviation across folds.
    pub std: f64,
}

/// Outcome of evaluating one hyperparameter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Best fold-averaged AUC (higher is better).
    pub score: f64,
    /// Round at which `score` was reached.
    pub best_round: usize,
    /// Rounds actually trained before the budget or early stopping ended the run.
    pub rounds_trained: usize,
    pub curve: Vec<RoundMetric>,
    /// Out-of-fold probabilities at `best_round`, aligned with the training records.
    pub oof_predictions: Option<Vec<f64>>,
}

impl EvaluationResult {
    /// A result carrying only a score, for evaluators without a round curve.
    pub fn from_score(score: f64) -> Self {
        Self {
            score,
            best_round: 0,
            rounds_trained: 0,
            curve: Vec::new(),
            oof_predictions: None,
        }
    }

    pub fn stopped_early(&self, max_rounds: usize) -> bool {
        self.rounds_trained < max_rounds
    }
}

/// Scores a hyperparameter configuration.
///
/// Implementations reject configurations outside their declared bounds with
/// `TuneError::ConfigurationInvalid` and report numerical failure with
/// `TuneError::TrainingDivergence`.
pub trait ModelEvaluator {
    fn evaluate(&self, params: &HyperParameters) -> BtResult<EvaluationResult>;
}

impl<F> ModelEvaluator for F
where
    F: Fn(&HyperParameters) -> BtResult<EvaluationResult>,
{
    fn evaluate(&self, params: &HyperParameters) -> BtResult<EvaluationResult> {
        self(params)
    }
}
