//! Booster abstraction and the default logistic gradient-boosted trees.

use bt_data::DesignMatrix;
use bt_types::{
    validation_error, BtError, BtResult, HyperParameters, ParamValue, ParameterKind, SearchSpace,
    TuneError,
};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::tree::{RegressionTree, TreeParams};

/// Training knobs understood by the default booster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoosterParams {
    pub max_depth: usize,
    pub eta: f64,
    pub min_child_weight: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub gamma: f64,
    pub lambda: f64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            max_depth: 6,
            eta: 0.3,
            min_child_weight: 1.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            gamma: 0.0,
            lambda: 1.0,
        }
    }
}

impl BoosterParams {
    /// Overlay a configuration on the defaults. Names the booster does not
    /// know are rejected rather than ignored.
    pub fn from_hyperparameters(params: &HyperParameters) -> BtResult<Self> {
        let mut out = Self::default();
        for (name, value) in params.iter() {
            let v = value.as_f64();
            match name {
                "max_depth" => {
                    if v < 0.0 || v.fract() != 0.0 {
                        return Err(invalid(name, format!("expected a non-negative integer, got {value}")));
                    }
                    out.max_depth = v as usize;
                }
                "eta" => out.eta = v,
                "min_child_weight" => out.min_child_weight = v,
                "subsample" => out.subsample = v,
                "colsample_bytree" => out.colsample_bytree = v,
                "gamma" => out.gamma = v,
                "lambda" => out.lambda = v,
                other => return Err(invalid(other, "not a booster parameter".to_string())),
            }
        }
        out.validate()?;
        Ok(out)
    }

    /// Reject a search space containing a point the booster would refuse:
    /// an unknown name, a non-integer `max_depth`, or a bound outside a
    /// parameter's admissible range. Every admissible range is an interval,
    /// so checking both ends covers the whole declared range.
    pub fn check_space(space: &SearchSpace) -> BtResult<()> {
        for def in &space.parameters {
            if def.name == "max_depth" && !matches!(def.kind, ParameterKind::IntRange { .. }) {
                return Err(invalid(&def.name, "must be declared as an integer range".to_string()));
            }
            let ends = match def.kind {
                ParameterKind::IntRange { low, high } => [ParamValue::Int(low), ParamValue::Int(high)],
                ParameterKind::FloatRange { low, high } | ParameterKind::LogUniform { low, high } => {
                    [ParamValue::Float(low), ParamValue::Float(high)]
                }
            };
            for end in ends {
                let point = HyperParameters::new().with(def.name.as_str(), end);
                Self::from_hyperparameters(&point).map_err(|err| match err {
                    BtError::Tune(TuneError::ConfigurationInvalid { parameter, message }) => {
                        let (low, high) = def.kind.bounds();
                        invalid(&parameter, format!("declared bounds [{low}, {high}] admit a rejected value: {message}"))
                    }
                    other => other,
                })?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> BtResult<()> {
        if !(self.eta > 0.0 && self.eta.is_finite()) {
            return Err(invalid("eta", format!("must be positive, got {}", self.eta)));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(invalid("subsample", format!("must be in (0, 1], got {}", self.subsample)));
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return Err(invalid(
                "colsample_bytree",
                format!("must be in (0, 1], got {}", self.colsample_bytree),
            ));
        }
        if !(self.min_child_weight >= 0.0 && self.min_child_weight.is_finite()) {
            return Err(invalid("min_child_weight", format!("must be >= 0, got {}", self.min_child_weight)));
        }
        if !(self.gamma >= 0.0 && self.gamma.is_finite()) {
            return Err(invalid("gamma", format!("must be >= 0, got {}", self.gamma)));
        }
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(invalid("lambda", format!("must be >= 0, got {}", self.lambda)));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            gamma: self.gamma,
            lambda: self.lambda,
            eta: self.eta,
        }
    }
}

fn invalid(parameter: &str, message: String) -> bt_types::BtError {
    TuneError::ConfigurationInvalid {
        parameter: parameter.to_string(),
        message,
    }
    .into()
}

/// Produces boosting sessions for a training set.
pub trait Booster: Send + Sync {
    fn name(&self) -> &str;

    /// Begin boosting on `train`, tracking predictions for `eval` after every round.
    fn start(
        &self,
        train: DesignMatrix,
        eval: Option<Array2<f64>>,
        params: &BoosterParams,
        seed: u64,
    ) -> BtResult<Box<dyn BoostingSession>>;
}

/// An in-progress boosting run, advanced one round at a time.
pub trait BoostingSession: Send {
    /// Add one tree. Fails with `TrainingDivergence` when the training loss
    /// or any tracked prediction stops being finite.
    fn boost_round(&mut self) -> BtResult<()>;

    fn rounds(&self) -> usize;

    /// Positive-class probabilities for the evaluation rows after the latest round.
    fn eval_predictions(&self) -> Vec<f64>;

    fn into_predictor(self: Box<Self>) -> Box<dyn Predictor>;
}

/// A trained model scoring new rows.
pub trait Predictor: Send + Sync {
    fn predict_proba(&self, features: &Array2<f64>) -> Vec<f64>;

    fn rounds(&self) -> usize;
}

fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

/// Logistic-loss boosted regression trees with exact greedy splits.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientBoostedTrees;

impl Booster for GradientBoostedTrees {
    fn name(&self) -> &str {
        "gbtree"
    }

    fn start(
        &self,
        train: DesignMatrix,
        eval: Option<Array2<f64>>,
        params: &BoosterParams,
        seed: u64,
    ) -> BtResult<Box<dyn BoostingSession>> {
        params.validate()?;
        if train.n_rows() == 0 || train.n_columns() == 0 {
            return Err(validation_error!(
                "cannot boost on a {}x{} design matrix",
                train.n_rows(),
                train.n_columns()
            ));
        }
        if let Some(eval) = &eval {
            if eval.ncols() != train.n_columns() {
                return Err(validation_error!(
                    "evaluation rows have {} columns, training has {}",
                    eval.ncols(),
                    train.n_columns()
                ));
            }
        }

        let n_eval = eval.as_ref().map_or(0, |e| e.nrows());
        Ok(Box::new(GbtSession {
            targets: train.labels.iter().map(|&l| f64::from(l != 0)).collect(),
            margins: vec![0.0; train.n_rows()],
            eval_margins: vec![0.0; n_eval],
            features: train.features,
            eval,
            params: *params,
            trees: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
        }))
    }
}

struct GbtSession {
    features: Array2<f64>,
    targets: Vec<f64>,
    margins: Vec<f64>,
    eval: Option<Array2<f64>>,
    eval_margins: Vec<f64>,
    params: BoosterParams,
    trees: Vec<RegressionTree>,
    rng: ChaCha8Rng,
}

impl GbtSession {
    fn sample_rows(&mut self) -> Vec<usize> {
        let n = self.targets.len();
        if self.params.subsample >= 1.0 {
            return (0..n).collect();
        }
        let rows: Vec<usize> = (0..n)
            .filter(|_| self.rng.random::<f64>() < self.params.subsample)
            .collect();
        if rows.is_empty() {
            vec![self.rng.random_range(0..n)]
        } else {
            rows
        }
    }

    fn sample_columns(&mut self) -> Vec<usize> {
        let n = self.features.ncols();
        let mut cols: Vec<usize> = (0..n).collect();
        if self.params.colsample_bytree < 1.0 {
            let keep = ((n as f64 * self.params.colsample_bytree).ceil() as usize).clamp(1, n);
            cols.shuffle(&mut self.rng);
            cols.truncate(keep);
            cols.sort_unstable();
        }
        cols
    }

    fn diverged(&self, message: String) -> bt_types::BtError {
        TuneError::TrainingDivergence {
            round: self.trees.len() + 1,
            message,
        }
        .into()
    }
}

impl BoostingSession for GbtSession {
    fn boost_round(&mut self) -> BtResult<()> {
        let (grad, hess): (Vec<f64>, Vec<f64>) = self
            .margins
            .iter()
            .zip(&self.targets)
            .map(|(&m, &y)| {
                let p = sigmoid(m);
                (p - y, (p * (1.0 - p)).max(1e-16))
            })
            .unzip();

        let rows = self.sample_rows();
        let cols = self.sample_columns();
        let tree = RegressionTree::grow(
            &self.features,
            &grad,
            &hess,
            &rows,
            &cols,
            self.params.tree_params(),
        );

        for (margin, row) in self.margins.iter_mut().zip(self.features.axis_iter(Axis(0))) {
            *margin += tree.predict_row(row);
        }
        if let Some(eval) = &self.eval {
            for (margin, row) in self.eval_margins.iter_mut().zip(eval.axis_iter(Axis(0))) {
                *margin += tree.predict_row(row);
            }
        }

        let loss = self
            .margins
            .iter()
            .zip(&self.targets)
            .map(|(&m, &y)| {
                // log(1 + e^m) - y*m, stable for large |m|.
                m.max(0.0) + (-m.abs()).exp().ln_1p() - y * m
            })
            .sum::<f64>()
            / self.targets.len() as f64;
        if !loss.is_finite() {
            return Err(self.diverged(format!("training log-loss is {loss}")));
        }
        if self.eval_margins.iter().any(|m| !m.is_finite()) {
            return Err(self.diverged("non-finite evaluation prediction".to_string()));
        }

        self.trees.push(tree);
        tracing::trace!("round {} log-loss {:.6}", self.trees.len(), loss);
        Ok(())
    }

    fn rounds(&self) -> usize {
        self.trees.len()
    }

    fn eval_predictions(&self) -> Vec<f64> {
        self.eval_margins.iter().map(|&m| sigmoid(m)).collect()
    }

    fn into_predictor(self: Box<Self>) -> Box<dyn Predictor> {
        Box::new(TreeEnsemble { trees: self.trees })
    }
}

/// Frozen sum of trees; the probability is the sigmoid of the summed leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    trees: Vec<RegressionTree>,
}

impl TreeEnsemble {
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }
}

impl Predictor for TreeEnsemble {
    fn predict_proba(&self, features: &Array2<f64>) -> Vec<f64> {
        features
            .axis_iter(Axis(0))
            .map(|row| sigmoid(self.trees.iter().map(|t| t.predict_row(row)).sum()))
            .collect()
    }

    fn rounds(&self) -> usize {
        self.trees.len()
    }
}
