use std::fmt;

use bt_types::{validation_error, BtResult};
use serde::{Deserialize, Serialize};

/// Counts of a binary classifier against true labels; label 1 is positive.
///
/// Ratios with an empty denominator are NaN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        f64::NAN
    } else {
        num as f64 / den as f64
    }
}

impl ConfusionMatrix {
    pub fn from_predictions(predicted: &[u8], labels: &[u8]) -> BtResult<Self> {
        if predicted.len() != labels.len() {
            return Err(validation_error!(
                "{} predictions but {} labels",
                predicted.len(),
                labels.len()
            ));
        }
        if predicted.is_empty() {
            return Err(validation_error!("confusion matrix needs at least one record"));
        }

        let mut m = Self {
            true_positive: 0,
            false_positive: 0,
            true_negative: 0,
            false_negative: 0,
        };
        for (&p, &y) in predicted.iter().zip(labels) {
            match (p != 0, y != 0) {
                (true, true) => m.true_positive += 1,
                (true, false) => m.false_positive += 1,
                (false, false) => m.true_negative += 1,
                (false, true) => m.false_negative += 1,
            }
        }
        Ok(m)
    }

    /// Classify `p >= threshold` as positive.
    pub fn at_threshold(probabilities: &[f64], labels: &[u8], threshold: f64) -> BtResult<Self> {
        let predicted: Vec<u8> = probabilities.iter().map(|&p| u8::from(p >= threshold)).collect();
        Self::from_predictions(&predicted, labels)
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn sensitivity(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn specificity(&self) -> f64 {
        ratio(self.true_negative, self.true_negative + self.false_positive)
    }

    pub fn balanced_accuracy(&self) -> f64 {
        (self.sensitivity() + self.specificity()) / 2.0
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn negative_predictive_value(&self) -> f64 {
        ratio(self.true_negative, self.true_negative + self.false_negative)
    }

    pub fn prevalence(&self) -> f64 {
        ratio(self.true_positive + self.false_negative, self.total())
    }

    /// Cohen's kappa: agreement beyond what the marginals predict by chance.
    pub fn kappa(&self) -> f64 {
        let n = self.total() as f64;
        let observed = self.accuracy();
        let predicted_pos = (self.true_positive + self.false_positive) as f64 / n;
        let actual_pos = (self.true_positive + self.false_negative) as f64 / n;
        let expected = predicted_pos * actual_pos + (1.0 - predicted_pos) * (1.0 - actual_pos);
        if (1.0 - expected).abs() < f64::EPSILON {
            f64::NAN
        } else {
            (observed - expected) / (1.0 - expected)
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "              Reference")?;
        writeln!(f, "Prediction   {:>8} {:>8}", "0", "1")?;
        writeln!(f, "         0   {:>8} {:>8}", self.true_negative, self.false_negative)?;
        writeln!(f, "         1   {:>8} {:>8}", self.false_positive, self.true_positive)?;
        writeln!(f)?;
        writeln!(f, "Accuracy            {:.4}", self.accuracy())?;
        writeln!(f, "Kappa               {:.4}", self.kappa())?;
        writeln!(f, "Sensitivity         {:.4}", self.sensitivity())?;
        writeln!(f, "Specificity         {:.4}", self.specificity())?;
        writeln!(f, "Pos Pred Value      {:.4}", self.precision())?;
        writeln!(f, "Neg Pred Value      {:.4}", self.negative_predictive_value())?;
        writeln!(f, "Prevalence          {:.4}", self.prevalence())?;
        writeln!(f, "Balanced accuracy   {:.4}", self.balanced_accuracy())
    }
}
