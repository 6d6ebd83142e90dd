use bt_types::{config_error, BtResult};
use serde::{Deserialize, Serialize};

/// Acquisition functions for maximizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcquisitionFunction {
    /// Upper confidence bound: `mean + kappa * std`.
    Ucb { kappa: f64 },
    /// Expected improvement over the incumbent plus `xi`.
    Ei { xi: f64 },
    /// Probability of improving on the incumbent plus `xi`.
    Pi { xi: f64 },
}

impl Default for AcquisitionFunction {
    fn default() -> Self {
        Self::Ucb { kappa: 2.576 }
    }
}

impl AcquisitionFunction {
    /// Parse a policy name ("ucb", "ei", "poi"/"pi").
    pub fn from_name(name: &str, kappa: f64, xi: f64) -> BtResult<Self> {
        let acquisition = match name.to_ascii_lowercase().as_str() {
            "ucb" => Self::Ucb { kappa },
            "ei" => Self::Ei { xi },
            "poi" | "pi" => Self::Pi { xi },
            other => return Err(config_error!("unknown acquisition function '{}'", other)),
        };
        acquisition.validate()?;
        Ok(acquisition)
    }

    pub fn validate(&self) -> BtResult<()> {
        match *self {
            Self::Ucb { kappa } if !(kappa >= 0.0 && kappa.is_finite()) => {
                Err(config_error!("kappa must be a non-negative number, got {}", kappa))
            }
            Self::Ei { xi } | Self::Pi { xi } if !xi.is_finite() => {
                Err(config_error!("xi must be finite, got {}", xi))
            }
            _ => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ucb { .. } => "ucb",
            Self::Ei { .. } => "ei",
            Self::Pi { .. } => "poi",
        }
    }

    /// Utility of a candidate with posterior `mean`/`std` given the best observed score.
    pub fn score(&self, mean: f64, std: f64, best: f64) -> f64 {
        let std = std.max(1e-12);
        match *self {
            Self::Ucb { kappa } => mean + kappa * std,
            Self::Ei { xi } => {
                let improvement = mean - best - xi;
                let z = improvement / std;
                improvement * normal_cdf(z) + std * normal_pdf(z)
            }
            Self::Pi { xi } => normal_cdf((mean - best - xi) / std),
        }
    }
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    const A: [f64; 5] = [0.254829592, -0.284496736, 1.421413741, -1.453152027, 1.061405429];
    const P: f64 = 0.3275911;

    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = A.iter().rev().fold(0.0, |acc, a| acc * t + a) * t;
    sign * (1.0 - poly * (-x * x).exp())
}
