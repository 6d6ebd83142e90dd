//! Cross-validated scoring of hyperparameter configurations.

use std::time::Instant;

use bt_data::{DesignMatrix, FoldAssignment};
use bt_types::{
    validation_error, BtResult, EvaluationResult, HyperParameters, ModelEvaluator, RoundMetric,
    SearchSpace,
};
use ndarray::Axis;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::booster::{Booster, BoosterParams, BoostingSession, GradientBoostedTrees, Predictor};
use crate::metrics::auc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CvSettings {
    pub max_rounds: usize,
    /// Stop once this many rounds pass without a new best averaged AUC.
    pub early_stopping_rounds: usize,
    pub seed: u64,
    /// Collect out-of-fold predictions at the best round.
    pub keep_oof: bool,
}

impl Default for CvSettings {
    fn default() -> Self {
        Self {
            max_rounds: 1000,
            early_stopping_rounds: 20,
            seed: 0,
            keep_oof: false,
        }
    }
}

struct FoldRun {
    session: Box<dyn BoostingSession>,
    test: Vec<usize>,
    test_labels: Vec<u8>,
}

/// Scores configurations by k-fold cross-validated AUC with early stopping.
#[derive(Debug)]
pub struct CvEvaluator<B: Booster = GradientBoostedTrees> {
    data: DesignMatrix,
    folds: FoldAssignment,
    space: SearchSpace,
    settings: CvSettings,
    booster: B,
}

impl CvEvaluator<GradientBoostedTrees> {
    pub fn new(
        data: DesignMatrix,
        folds: FoldAssignment,
        space: SearchSpace,
        settings: CvSettings,
    ) -> BtResult<Self> {
        Self::with_booster(data, folds, space, settings, GradientBoostedTrees)
    }
}

impl<B: Booster> CvEvaluator<B> {
    pub fn with_booster(
        data: DesignMatrix,
        folds: FoldAssignment,
        space: SearchSpace,
        settings: CvSettings,
        booster: B,
    ) -> BtResult<Self> {
        if folds.len() != data.n_rows() {
            return Err(validation_error!(
                "fold assignment covers {} records, design matrix has {}",
                folds.len(),
                data.n_rows()
            ));
        }
        if settings.max_rounds == 0 {
            return Err(validation_error!("max_rounds must be at least 1"));
        }
        if settings.early_stopping_rounds == 0 {
            return Err(validation_error!("early_stopping_rounds must be at least 1"));
        }
        space.validate()?;
        BoosterParams::check_space(&space)?;

        Ok(Self {
            data,
            folds,
            space,
            settings,
            booster,
        })
    }

    pub fn settings(&self) -> &CvSettings {
        &self.settings
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// Check `params` against the search space and translate them for the booster.
    fn booster_params(&self, params: &HyperParameters) -> BtResult<BoosterParams> {
        self.space.check(params)?;
        BoosterParams::from_hyperparameters(params)
    }

    fn start_folds(&self, params: &BoosterParams) -> BtResult<Vec<FoldRun>> {
        self.folds
            .splits()
            .into_iter()
            .map(|split| -> BtResult<FoldRun> {
                let train = self.data.select_rows(&split.train);
                let eval = self.data.features.select(Axis(0), &split.test);
                let seed = self.settings.seed.wrapping_add(split.fold as u64);
                Ok(FoldRun {
                    session: self.booster.start(train, Some(eval), params, seed)?,
                    test_labels: split.test.iter().map(|&i| self.data.labels[i]).collect(),
                    test: split.test,
                })
            })
            .collect()
    }

    /// Train on the whole design matrix for exactly `rounds` rounds.
    pub fn train_final(&self, params: &HyperParameters, rounds: usize) -> BtResult<Box<dyn Predictor>> {
        if rounds == 0 {
            return Err(validation_error!("final model needs at least one round"));
        }
        let bp = self.booster_params(params)?;
        let mut session = self
            .booster
            .start(self.data.clone(), None, &bp, self.settings.seed)?;
        for _ in 0..rounds {
            session.boost_round()?;
        }
        tracing::info!(
            "Trained final {} model for {} rounds on {} records",
            self.booster.name(),
            rounds,
            self.data.n_rows()
        );
        Ok(session.into_predictor())
    }
}

impl<B: Booster> ModelEvaluator for CvEvaluator<B> {
    fn evaluate(&self, params: &HyperParameters) -> BtResult<EvaluationResult> {
        let started = Instant::now();
        let bp = self.booster_params(params)?;
        let mut runs = self.start_folds(&bp)?;

        let mut curve = Vec::new();
        let mut best: Option<RoundMetric> = None;
        let mut oof: Option<Vec<f64>> = None;

        for round in 1..=self.settings.max_rounds {
            runs.par_iter_mut()
                .try_for_each(|run| run.session.boost_round())?;

            let predictions: Vec<Vec<f64>> =
                runs.iter().map(|run| run.session.eval_predictions()).collect();
            let scores = runs
                .iter()
                .zip(&predictions)
                .map(|(run, preds)| auc(preds, &run.test_labels))
                .collect::<BtResult<Vec<f64>>>()?;

            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            let var = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
            let metric = RoundMetric {
                round,
                mean,
                std: var.sqrt(),
            };
            curve.push(metric);

            if best.map_or(true, |b| mean > b.mean) {
                best = Some(metric);
                if self.settings.keep_oof {
                    let mut snapshot = vec![0.0; self.data.n_rows()];
                    for (run, preds) in runs.iter().zip(&predictions) {
                        for (&idx, &p) in run.test.iter().zip(preds) {
                            snapshot[idx] = p;
                        }
                    }
                    oof = Some(snapshot);
                }
            } else if best.map_or(false, |b| round - b.round >= self.settings.early_stopping_rounds) {
                break;
            }
        }

        let best = best.ok_or_else(|| validation_error!("no boosting rounds were run"))?;
        let rounds_trained = curve.len();
        tracing::debug!(
            "CV AUC {:.5} (sd {:.5}) at round {}/{} for {} in {:?}",
            best.mean,
            best.std,
            best.round,
            rounds_trained,
            params,
            started.elapsed()
        );

        Ok(EvaluationResult {
            score: best.mean,
            best_round: best.round,
            rounds_trained,
            curve,
            oof_predictions: oof,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_data::stratified_folds;
    use bt_types::{BtError, ParamValue, TuneError};
    use ndarray::Array2;
    use proptest::prelude::*;

    /// Two noisy informative features and one pure-noise feature.
    fn design(n: usize) -> DesignMatrix {
        let mut features = Array2::zeros((n, 3));
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let label = u8::from(i % 3 == 0);
            let jitter = ((i * 37) % 11) as f64 / 11.0;
            features[[i, 0]] = f64::from(label) * 1.5 + jitter;
            features[[i, 1]] = ((i * 53) % 7) as f64 + f64::from(label);
            features[[i, 2]] = ((i * 29) % 13) as f64;
            labels.push(label);
        }
        DesignMatrix {
            features,
            labels,
            columns: vec!["x0".into(), "x1".into(), "noise".into()],
        }
    }

    fn space() -> SearchSpace {
        SearchSpace::new()
            .add_int("max_depth", 1, 6)
            .add_float("eta", 0.01, 0.5)
    }

    fn params(depth: i64, eta: f64) -> HyperParameters {
        HyperParameters::new()
            .with("max_depth", ParamValue::Int(depth))
            .with("eta", ParamValue::Float(eta))
    }

    fn evaluator(settings: CvSettings) -> CvEvaluator {
        let data = design(120);
        let folds = stratified_folds(&data.labels, 4, 5).unwrap();
        CvEvaluator::new(data, folds, space(), settings).unwrap()
    }

    fn settings(max_rounds: usize, patience: usize) -> CvSettings {
        CvSettings {
            max_rounds,
            early_stopping_rounds: patience,
            seed: 3,
            keep_oof: true,
        }
    }

    #[test]
    fn informative_features_beat_chance() {
        let result = evaluator(settings(30, 10)).evaluate(&params(3, 0.3)).unwrap();
        assert!(result.score > 0.7, "score {}", result.score);
        assert!(result.best_round >= 1 && result.best_round <= result.rounds_trained);
        assert_eq!(result.curve.len(), result.rounds_trained);
        assert!(result.curve.iter().all(|m| m.mean <= result.score));
    }

    #[test]
    fn out_of_fold_predictions_cover_every_record() {
        let result = evaluator(settings(10, 5)).evaluate(&params(2, 0.3)).unwrap();
        let oof = result.oof_predictions.unwrap();
        assert_eq!(oof.len(), 120);
        assert!(oof.iter().all(|p| *p > 0.0 && *p < 1.0));
    }

    #[test]
    fn early_stopping_respects_patience() {
        let result = evaluator(settings(200, 3)).evaluate(&params(6, 0.5)).unwrap();
        if result.stopped_early(200) {
            assert_eq!(result.rounds_trained, result.best_round + 3);
        }
    }

    #[test]
    fn evaluation_is_deterministic() {
        let ev = evaluator(settings(15, 5));
        assert_eq!(
            ev.evaluate(&params(3, 0.2)).unwrap(),
            ev.evaluate(&params(3, 0.2)).unwrap()
        );
    }

    #[test]
    fn out_of_bounds_configuration_is_rejected() {
        let ev = evaluator(settings(5, 2));
        for bad in [params(7, 0.1), params(3, 0.6), params(0, 0.1)] {
            let err = ev.evaluate(&bad).unwrap_err();
            assert!(matches!(err, BtError::Tune(TuneError::ConfigurationInvalid { .. })));
        }
        let missing = HyperParameters::new().with("max_depth", ParamValue::Int(3));
        assert!(ev.evaluate(&missing).is_err());
    }

    #[test]
    fn final_model_scores_holdout_rows() {
        let ev = evaluator(settings(10, 5));
        let model = ev.train_final(&params(3, 0.3), 12).unwrap();
        assert_eq!(model.rounds(), 12);

        let holdout = design(30);
        let probs = model.predict_proba(&holdout.features);
        assert_eq!(probs.len(), 30);
        assert!(auc(&probs, &holdout.labels).unwrap() > 0.7);
        assert!(ev.train_final(&params(3, 0.3), 0).is_err());
    }

    #[test]
    fn bounds_the_booster_refuses_are_rejected_up_front() {
        let data = design(60);
        let folds = stratified_folds(&data.labels, 3, 1).unwrap();
        let wide = SearchSpace::new()
            .add_int("max_depth", 1, 4)
            .add_float("subsample", 0.0, 1.0);
        let err = CvEvaluator::new(data, folds, wide, CvSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            BtError::Tune(TuneError::ConfigurationInvalid { ref parameter, .. }) if parameter == "subsample"
        ));
    }

    #[test]
    fn every_corner_of_the_space_evaluates() {
        let data = design(60);
        let folds = stratified_folds(&data.labels, 3, 1).unwrap();
        let space = SearchSpace::new()
            .add_int("max_depth", 1, 4)
            .add_float("subsample", 0.05, 1.0);
        let ev = CvEvaluator::new(data, folds, space.clone(), settings(3, 2)).unwrap();
        for t in [0.0, 1.0] {
            let config = space.from_unit(&[t, t]);
            assert!(space.check(&config).is_ok());
            assert!(ev.evaluate(&config).is_ok(), "{config} was refused");
        }
    }

    #[test]
    fn rejects_misaligned_folds() {
        let data = design(60);
        let folds = stratified_folds(&design(90).labels, 3, 1).unwrap();
        assert!(CvEvaluator::new(data, folds, space(), CvSettings::default()).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn scores_are_valid_auc(depth in 1i64..=6, eta in 0.01f64..0.5) {
            let result = evaluator(settings(5, 2)).evaluate(&params(depth, eta)).unwrap();
            prop_assert!((0.0..=1.0).contains(&result.score));
            prop_assert!(result.rounds_trained <= 5);
        }
    }
}
