//! # bt-report
//!
//! Turns holdout probabilities into a decision: picks the probability cutoff
//! and summarizes the resulting confusion matrix.

mod confusion;
mod threshold;

pub use confusion::ConfusionMatrix;
pub use threshold::{select_threshold, threshold_grid, HoldoutReport, ThresholdPoint};
