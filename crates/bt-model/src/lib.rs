//! # bt-model
//!
//! Model training and scoring for BoostTune.
//!
//! Provides the booster abstraction with a default gradient-boosted tree
//! implementation, the rank-based AUC metric, and the cross-validated
//! evaluator the optimizer calls for every trial.

mod booster;
mod cv;
mod metrics;
mod tree;

pub use booster::{Booster, BoosterParams, BoostingSession, GradientBoostedTrees, Predictor, TreeEnsemble};
pub use cv::{CvEvaluator, CvSettings};
pub use metrics::auc;
pub use tree::{Node, RegressionTree};
