use std::fmt;

use bt_model::auc;
use bt_types::{validation_error, BtResult};
use serde::{Deserialize, Serialize};

use crate::confusion::ConfusionMatrix;

/// Candidate cutoffs 0.01, 0.02, ..., 0.99.
pub fn threshold_grid() -> Vec<f64> {
    (1..=99).map(|i| f64::from(i) / 100.0).collect()
}

fn binarize(probabilities: &[f64], threshold: f64) -> Vec<f64> {
    probabilities
        .iter()
        .map(|&p| if p >= threshold { 1.0 } else { 0.0 })
        .collect()
}

fn check_inputs(probabilities: &[f64], labels: &[u8]) -> BtResult<()> {
    if probabilities.is_empty() {
        return Err(validation_error!("no predictions to threshold"));
    }
    if probabilities.len() != labels.len() {
        return Err(validation_error!(
            "{} predictions but {} labels",
            probabilities.len(),
            labels.len()
        ));
    }
    Ok(())
}

/// Pick the cutoff whose binarized predictions have the highest AUC.
///
/// Returns the chosen threshold and the AUC at every candidate, in candidate
/// order. On a tie the earliest candidate wins.
pub fn select_threshold(
    probabilities: &[f64],
    labels: &[u8],
    thresholds: &[f64],
) -> BtResult<(f64, Vec<f64>)> {
    check_inputs(probabilities, labels)?;
    if thresholds.is_empty() {
        return Err(validation_error!("no candidate thresholds"));
    }

    let curve = thresholds
        .iter()
        .map(|&t| auc(&binarize(probabilities, t), labels))
        .collect::<BtResult<Vec<f64>>>()?;

    let mut best = 0;
    for (i, &value) in curve.iter().enumerate() {
        if value > curve[best] {
            best = i;
        }
    }
    Ok((thresholds[best], curve))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub threshold: f64,
    pub auc: f64,
}

/// Holdout evaluation at the selected cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutReport {
    /// AUC of the raw probabilities.
    pub auc: f64,
    pub threshold: f64,
    pub curve: Vec<ThresholdPoint>,
    pub matrix: ConfusionMatrix,
}

impl HoldoutReport {
    pub fn build(probabilities: &[f64], labels: &[u8], thresholds: &[f64]) -> BtResult<Self> {
        let (threshold, values) = select_threshold(probabilities, labels, thresholds)?;
        let report = Self {
            auc: auc(probabilities, labels)?,
            threshold,
            curve: thresholds
                .iter()
                .zip(values)
                .map(|(&threshold, auc)| ThresholdPoint { threshold, auc })
                .collect(),
            matrix: ConfusionMatrix::at_threshold(probabilities, labels, threshold)?,
        };
        tracing::info!(
            "Holdout AUC {:.4}; threshold {:.2} gives balanced accuracy {:.4}",
            report.auc,
            report.threshold,
            report.matrix.balanced_accuracy()
        );
        Ok(report)
    }
}

impl fmt::Display for HoldoutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Holdout AUC:        {:.4}", self.auc)?;
        writeln!(f, "Decision threshold: {:.2}", self.threshold)?;
        writeln!(f)?;
        write!(f, "{}", self.matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_spans_one_to_ninety_nine_percent() {
        let grid = threshold_grid();
        assert_eq!(grid.len(), 99);
        assert_eq!(grid[0], 0.01);
        assert_eq!(grid[98], 0.99);
        assert!(grid.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn separable_predictions_get_a_perfect_threshold() {
        let probs = [0.2, 0.6, 0.9, 0.4];
        let labels = [0, 1, 1, 0];
        let (threshold, curve) = select_threshold(&probs, &labels, &threshold_grid()).unwrap();

        assert!(threshold > 0.4 && threshold <= 0.6, "threshold {threshold}");
        assert_eq!(curve.iter().cloned().fold(f64::MIN, f64::max), 1.0);
        let matrix = ConfusionMatrix::at_threshold(&probs, &labels, threshold).unwrap();
        assert_eq!(matrix.sensitivity(), 1.0);
        assert_eq!(matrix.specificity(), 1.0);
    }

    #[test]
    fn ties_go_to_the_lowest_threshold() {
        let (threshold, curve) =
            select_threshold(&[0.2, 0.6, 0.9, 0.4], &[0, 1, 1, 0], &threshold_grid()).unwrap();
        // Every cutoff in (0.4, 0.6] separates the classes; 0.41 comes first.
        assert_eq!(threshold, 0.41);
        assert_eq!(curve[39], 0.75);
        assert_eq!(curve[40], 1.0);
    }

    #[test]
    fn selection_is_deterministic() {
        let probs: Vec<f64> = (0..50).map(|i| ((i * 7919) % 100) as f64 / 100.0).collect();
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i % 3 == 0)).collect();
        let grid = threshold_grid();
        assert_eq!(
            select_threshold(&probs, &labels, &grid).unwrap(),
            select_threshold(&probs, &labels, &grid).unwrap()
        );
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(select_threshold(&[], &[], &threshold_grid()).is_err());
        assert!(select_threshold(&[0.5], &[0, 1], &threshold_grid()).is_err());
        assert!(select_threshold(&[0.2, 0.8], &[0, 1], &[]).is_err());
    }

    #[test]
    fn report_renders_summary() {
        let report = HoldoutReport::build(&[0.1, 0.7, 0.8, 0.3, 0.65], &[0, 1, 1, 0, 0], &threshold_grid()).unwrap();
        assert_eq!(report.curve.len(), 99);
        let text = report.to_string();
        assert!(text.contains("Decision threshold"));
        assert!(text.contains("Balanced accuracy"));

        let json = serde_json::to_string(&report).unwrap();
        let back: HoldoutReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.threshold, report.threshold);
    }
}
