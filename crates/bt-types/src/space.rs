//! Search space definitions: a closed interval per tunable parameter.

use serde::{Deserialize, Serialize};

use crate::errors::{BtResult, TuneError};
use crate::params::{HyperParameters, ParamValue};

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Parameter name as the booster knows it (e.g. "max_depth").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes the closed interval a parameter lives in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous range [low, high].
    FloatRange { low: f64, high: f64 },
    /// Integer range [low, high] inclusive.
    IntRange { low: i64, high: i64 },
    /// Continuous range [low, high] searched in log-space.
    LogUniform { low: f64, high: f64 },
}

impl ParameterKind {
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Self::FloatRange { low, high } | Self::LogUniform { low, high } => (low, high),
            Self::IntRange { low, high } => (low as f64, high as f64),
        }
    }

    /// Map a value into [0, 1] (log-scaled for `LogUniform`).
    pub fn to_unit(&self, value: f64) -> f64 {
        let (low, high) = self.bounds();
        let t = match self {
            Self::LogUniform { .. } => {
                let span = high.ln() - low.ln();
                if span > 0.0 {
                    (value.ln() - low.ln()) / span
                } else {
                    0.5
                }
            }
            _ => {
                if high > low {
                    (value - low) / (high - low)
                } else {
                    0.5
                }
            }
        };
        t.clamp(0.0, 1.0)
    }

    /// Map a point of [0, 1] back into the interval. Integer ranges round to
    /// the nearest integer; the result always lies within the bounds.
    pub fn from_unit(&self, t: f64) -> ParamValue {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
        match *self {
            Self::FloatRange { low, high } => ParamValue::Float((low + t * (high - low)).clamp(low, high)),
            Self::LogUniform { low, high } => {
                let v = (low.ln() + t * (high.ln() - low.ln())).exp();
                ParamValue::Float(v.clamp(low, high))
            }
            Self::IntRange { low, high } => {
                let v = (low as f64 + t * (high - low) as f64).round() as i64;
                ParamValue::Int(v.clamp(low, high))
            }
        }
    }

    /// Reason `value` is not admissible, if any.
    fn reject(&self, value: ParamValue) -> Option<String> {
        let (low, high) = self.bounds();
        let v = value.as_f64();
        if !v.is_finite() {
            return Some(format!("value {v} is not finite"));
        }
        if let Self::IntRange { .. } = self {
            if let ParamValue::Float(f) = value {
                if f.fract() != 0.0 {
                    return Some(format!("integer parameter given fractional value {f}"));
                }
            }
        }
        if v < low || v > high {
            return Some(format!("value {value} outside [{low}, {high}]"));
        }
        None
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::FloatRange { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::IntRange { low, high },
        });
        self
    }

    pub fn add_log_uniform(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::LogUniform { low, high },
        });
        self
    }

    pub fn dimension(&self) -> usize {
        self.parameters.len()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Reject malformed bounds before anything is evaluated.
    pub fn validate(&self) -> BtResult<()> {
        let empty = |message: String| TuneError::EmptySearchSpace { message };

        if self.parameters.is_empty() {
            return Err(empty("no parameters declared".to_string()).into());
        }

        for (i, param) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|p| p.name == param.name) {
                return Err(empty(format!("parameter {} declared twice", param.name)).into());
            }
            let (low, high) = param.kind.bounds();
            if !low.is_finite() || !high.is_finite() {
                return Err(empty(format!("parameter {} has non-finite bounds", param.name)).into());
            }
            if low > high {
                return Err(empty(format!(
                    "parameter {} has lower bound {} above upper bound {}",
                    param.name, low, high
                ))
                .into());
            }
            if let ParameterKind::LogUniform { .. } = param.kind {
                if low <= 0.0 {
                    return Err(empty(format!(
                        "log-uniform parameter {} needs a positive lower bound",
                        param.name
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Every declared parameter present, nothing undeclared, every value
    /// inside its closed interval.
    pub fn check(&self, params: &HyperParameters) -> BtResult<()> {
        let invalid = |parameter: &str, message: String| TuneError::ConfigurationInvalid {
            parameter: parameter.to_string(),
            message,
        };

        for def in &self.parameters {
            let value = params
                .get(&def.name)
                .ok_or_else(|| invalid(&def.name, "missing from configuration".to_string()))?;
            if let Some(reason) = def.kind.reject(value) {
                return Err(invalid(&def.name, reason).into());
            }
        }

        if let Some((name, _)) = params.iter().find(|(name, _)| self.get(name).is_none()) {
            return Err(invalid(name, "not part of the search space".to_string()).into());
        }
        Ok(())
    }

    /// Configuration from a point of the unit cube (one coordinate per parameter).
    pub fn from_unit(&self, point: &[f64]) -> HyperParameters {
        self.parameters
            .iter()
            .zip(point)
            .map(|(def, &t)| (def.name.clone(), def.kind.from_unit(t)))
            .collect()
    }

    /// Unit-cube coordinates of a configuration; absent parameters map to 0.5.
    pub fn to_unit(&self, params: &HyperParameters) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|def| {
                params
                    .get_f64(&def.name)
                    .map(|v| def.kind.to_unit(v))
                    .unwrap_or(0.5)
            })
            .collect()
    }
}
