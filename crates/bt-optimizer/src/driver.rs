//! The optimization loop: initial design, then surrogate-guided acquisition.

use std::time::Instant;

use bt_types::{
    internal_error, validation_error, BtError, BtResult, HyperParameters, ModelEvaluator,
    SearchSpace, TuneError,
};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionFunction;
use crate::sampler::DesignKind;
use crate::surrogate::{GaussianProcess, Surrogate};
use crate::trial::{SearchResult, TrialOrigin, TrialRecord};

/// Called with the full trial log after every recorded trial.
pub type TrialObserver<'o> = Box<dyn FnMut(&SearchResult) -> BtResult<()> + 'o>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub seed: u64,
    pub design: DesignKind,
    /// Uniform random candidates scored per acquisition step.
    pub n_candidates: usize,
    /// Number of top trials whose neighbourhoods are also searched.
    pub n_local: usize,
    pub local_per_trial: usize,
    /// Perturbation half-width in unit-cube coordinates.
    pub local_scale: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            design: DesignKind::default(),
            n_candidates: 1000,
            n_local: 5,
            local_per_trial: 20,
            local_scale: 0.1,
        }
    }
}

impl OptimizerSettings {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_design(mut self, design: DesignKind) -> Self {
        self.design = design;
        self
    }
}

/// Gaussian-process Bayesian optimizer maximizing the evaluator's score.
pub struct BayesianOptimizer<'o, S: Surrogate = GaussianProcess> {
    settings: OptimizerSettings,
    surrogate: S,
    observer: Option<TrialObserver<'o>>,
}

impl<'o> BayesianOptimizer<'o, GaussianProcess> {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self::with_surrogate(settings, GaussianProcess::default())
    }
}

impl<'o, S: Surrogate> BayesianOptimizer<'o, S> {
    pub fn with_surrogate(settings: OptimizerSettings, surrogate: S) -> Self {
        Self {
            settings,
            surrogate,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl FnMut(&SearchResult) -> BtResult<()> + 'o) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Evaluate `initial_sample_count` design points, then `iteration_count`
    /// acquisition-chosen points. The first evaluator failure aborts the search.
    pub fn optimize<E: ModelEvaluator + ?Sized>(
        &mut self,
        evaluator: &E,
        space: &SearchSpace,
        initial_sample_count: usize,
        iteration_count: usize,
        acquisition: AcquisitionFunction,
    ) -> BtResult<SearchResult> {
        self.resume(
            evaluator,
            space,
            SearchResult::new(),
            initial_sample_count,
            iteration_count,
            acquisition,
        )
    }

    /// Continue a search whose first trials are already in `completed`.
    ///
    /// Completed trials count against the budget in order: design points
    /// first, then iterations. The design is regenerated from the seed, so
    /// the remaining design points are the ones the interrupted run would
    /// have drawn; acquisition candidates are not replayed.
    pub fn resume<E: ModelEvaluator + ?Sized>(
        &mut self,
        evaluator: &E,
        space: &SearchSpace,
        completed: SearchResult,
        initial_sample_count: usize,
        iteration_count: usize,
        acquisition: AcquisitionFunction,
    ) -> BtResult<SearchResult> {
        space.validate()?;
        acquisition.validate()?;
        let budget = initial_sample_count + iteration_count;
        if budget == 0 {
            return Err(validation_error!("search budget is empty"));
        }
        if completed.len() > budget {
            return Err(validation_error!(
                "{} completed trials exceed the budget of {}",
                completed.len(),
                budget
            ));
        }
        for (i, trial) in completed.trials.iter().enumerate() {
            if trial.trial_number != i + 1 {
                return Err(validation_error!(
                    "completed trial at position {} is numbered {}",
                    i + 1,
                    trial.trial_number
                ));
            }
            space.check(&trial.params)?;
        }

        let dimension = space.dimension();
        let mut design = self.settings.design.build(self.settings.seed);
        let mut rng = ChaCha8Rng::seed_from_u64(self.settings.seed.wrapping_add(1));
        let done = completed.len();
        let mut result = completed;

        tracing::info!(
            "Starting search over {} parameters: {} {} samples, {} {} iterations, {} already done",
            dimension,
            initial_sample_count,
            design.name(),
            iteration_count,
            acquisition.name(),
            done
        );

        for point in design.sample(dimension, initial_sample_count).into_iter().skip(done) {
            self.run_trial(evaluator, space.from_unit(&point), TrialOrigin::Initial, &mut result)?;
        }

        for _ in 0..iteration_count.saturating_sub(done.saturating_sub(initial_sample_count)) {
            let (params, origin) = if result.is_empty() {
                let point = design.sample(dimension, 1).pop().unwrap_or_else(|| vec![0.5; dimension]);
                (space.from_unit(&point), TrialOrigin::Initial)
            } else {
                (self.propose(space, &result, acquisition, &mut rng)?, TrialOrigin::Acquired)
            };
            self.run_trial(evaluator, params, origin, &mut result)?;
        }

        if let Some(best) = result.best() {
            tracing::info!(
                "Search finished after {} trials; best AUC {:.5} at trial {} with {}",
                result.len(),
                best.score(),
                best.trial_number,
                best.params
            );
        }
        Ok(result)
    }

    fn run_trial<E: ModelEvaluator + ?Sized>(
        &mut self,
        evaluator: &E,
        params: HyperParameters,
        origin: TrialOrigin,
        result: &mut SearchResult,
    ) -> BtResult<()> {
        let trial_number = result.len() + 1;
        let wrap = |source: BtError| -> BtError {
            TuneError::Evaluator {
                trial: trial_number,
                source: Box::new(source),
            }
            .into()
        };

        let started = Instant::now();
        let outcome = evaluator.evaluate(&params).map_err(wrap)?;
        if !outcome.score.is_finite() {
            return Err(wrap(internal_error!("evaluator returned score {}", outcome.score)));
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            "Trial {} ({:?}): AUC {:.5} at round {} in {} ms",
            trial_number,
            origin,
            outcome.score,
            outcome.best_round,
            duration_ms
        );
        tracing::debug!("Trial {} parameters: {}", trial_number, params);

        result.push(TrialRecord::new(trial_number, params, outcome, origin, duration_ms));
        if let Some(observer) = self.observer.as_mut() {
            observer(&*result)?;
        }
        Ok(())
    }

    /// Fit the surrogate to every trial so far and return the candidate
    /// maximizing the acquisition function.
    fn propose(
        &mut self,
        space: &SearchSpace,
        result: &SearchResult,
        acquisition: AcquisitionFunction,
        rng: &mut ChaCha8Rng,
    ) -> BtResult<HyperParameters> {
        let dimension = space.dimension();
        let observed: Vec<f64> = result
            .trials
            .iter()
            .flat_map(|t| space.to_unit(&t.params))
            .collect();
        let x = Array2::from_shape_vec((result.len(), dimension), observed)
            .map_err(|e| internal_error!("trial matrix: {}", e))?;
        self.surrogate.fit(&x, &result.scores())?;

        let mut candidates: Vec<f64> = Vec::new();
        for _ in 0..self.settings.n_candidates {
            candidates.extend((0..dimension).map(|_| rng.random::<f64>()));
        }
        for best in result.leaderboard().into_iter().take(self.settings.n_local) {
            let centre = space.to_unit(&best.params);
            for _ in 0..self.settings.local_per_trial {
                candidates.extend(centre.iter().map(|&c| {
                    let step = self.settings.local_scale * (2.0 * rng.random::<f64>() - 1.0);
                    (c + step).clamp(0.0, 1.0)
                }));
            }
        }
        if candidates.is_empty() {
            candidates.extend((0..dimension).map(|_| rng.random::<f64>()));
        }

        let n = candidates.len() / dimension;
        let grid = Array2::from_shape_vec((n, dimension), candidates)
            .map_err(|e| internal_error!("candidate matrix: {}", e))?;
        let (means, stds) = self.surrogate.predict(&grid)?;

        let incumbent = result.best_score().unwrap_or(f64::NEG_INFINITY);
        let mut chosen = 0;
        let mut chosen_value = f64::NEG_INFINITY;
        for (i, (mean, std)) in means.iter().zip(&stds).enumerate() {
            let value = acquisition.score(*mean, *std, incumbent);
            if value > chosen_value {
                chosen = i;
                chosen_value = value;
            }
        }

        let point = grid.row(chosen).to_vec();
        tracing::debug!(
            "Acquisition {} picked candidate {} of {} (value {:.5}, mean {:.5}, sd {:.5})",
            acquisition.name(),
            chosen,
            n,
            chosen_value,
            means[chosen],
            stds[chosen]
        );
        Ok(space.from_unit(&point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_types::{EvaluationResult, ParamValue};
    use proptest::prelude::*;
    use std::cell::{Cell, RefCell};

    fn space() -> SearchSpace {
        SearchSpace::new()
            .add_int("max_depth", 1, 15)
            .add_float("subsample", 0.5, 1.0)
            .add_log_uniform("eta", 0.01, 0.3)
    }

    /// Smooth objective peaking at max_depth 4, subsample 0.8, eta 0.1.
    fn objective(p: &HyperParameters) -> BtResult<EvaluationResult> {
        let depth = p.get_f64("max_depth").unwrap_or(0.0);
        let sub = p.get_f64("subsample").unwrap_or(0.0);
        let eta = p.get_f64("eta").unwrap_or(1.0);
        let score = 0.9
            - 0.002 * (depth - 4.0).powi(2)
            - 0.5 * (sub - 0.8).powi(2)
            - 0.05 * (eta.ln() - 0.1f64.ln()).powi(2);
        Ok(EvaluationResult::from_score(score))
    }

    fn optimizer<'o>(seed: u64) -> BayesianOptimizer<'o> {
        BayesianOptimizer::new(OptimizerSettings {
            n_candidates: 200,
            ..OptimizerSettings::default().with_seed(seed)
        })
    }

    #[test]
    fn zero_iterations_returns_only_initial_trials() {
        let result = optimizer(1)
            .optimize(&objective, &space(), 6, 0, AcquisitionFunction::default())
            .unwrap();
        assert_eq!(result.len(), 6);
        assert!(result.trials.iter().all(|t| t.origin == TrialOrigin::Initial));
        let numbers: Vec<usize> = result.trials.iter().map(|t| t.trial_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn best_trial_dominates_every_trial() {
        for acquisition in [
            AcquisitionFunction::Ucb { kappa: 2.576 },
            AcquisitionFunction::Ei { xi: 0.0 },
            AcquisitionFunction::Pi { xi: 0.01 },
        ] {
            let result = optimizer(2)
                .optimize(&objective, &space(), 4, 6, acquisition)
                .unwrap();
            assert_eq!(result.len(), 10);
            let best = result.best().unwrap();
            assert!(result.trials.iter().all(|t| t.score() <= best.score()));
            assert_eq!(
                result.trials.iter().filter(|t| t.origin == TrialOrigin::Acquired).count(),
                6
            );
        }
    }

    #[test]
    fn acquisition_improves_on_the_initial_design() {
        let result = optimizer(5)
            .optimize(&objective, &space(), 5, 15, AcquisitionFunction::Ei { xi: 0.0 })
            .unwrap();
        let initial_best = result.trials[..5]
            .iter()
            .map(TrialRecord::score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert!(result.best_score().unwrap() >= initial_best);
        assert!(result.best_score().unwrap() > 0.8);
    }

    #[test]
    fn same_seed_same_search() {
        let run = |seed| {
            optimizer(seed)
                .optimize(&objective, &space(), 3, 3, AcquisitionFunction::default())
                .unwrap()
                .trials
                .into_iter()
                .map(|t| t.params)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(8), run(8));
    }

    #[test]
    fn empty_space_fails_before_evaluating() {
        let calls = Cell::new(0);
        let counting = |p: &HyperParameters| {
            calls.set(calls.get() + 1);
            objective(p)
        };

        let err = optimizer(1)
            .optimize(&counting, &SearchSpace::new(), 3, 3, AcquisitionFunction::default())
            .unwrap_err();
        assert!(matches!(err, BtError::Tune(TuneError::EmptySearchSpace { .. })));

        let inverted = SearchSpace::new().add_float("subsample", 1.0, 0.5);
        assert!(optimizer(1)
            .optimize(&counting, &inverted, 3, 3, AcquisitionFunction::default())
            .is_err());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn evaluator_failure_aborts_the_search() {
        let calls = Cell::new(0);
        let failing = |p: &HyperParameters| -> BtResult<EvaluationResult> {
            calls.set(calls.get() + 1);
            if calls.get() == 3 {
                return Err(TuneError::TrainingDivergence {
                    round: 7,
                    message: "loss is NaN".into(),
                }
                .into());
            }
            objective(p)
        };

        let err = optimizer(4)
            .optimize(&failing, &space(), 2, 5, AcquisitionFunction::default())
            .unwrap_err();
        assert_eq!(calls.get(), 3);
        match &err {
            BtError::Tune(TuneError::Evaluator { trial, .. }) => assert_eq!(*trial, 3),
            other => panic!("unexpected error {other}"),
        }
        assert!(matches!(
            err.root_cause(),
            BtError::Tune(TuneError::TrainingDivergence { round: 7, .. })
        ));
    }

    #[test]
    fn observer_sees_every_trial() {
        let seen = RefCell::new(Vec::new());
        let mut opt = optimizer(6).with_observer(|r: &SearchResult| {
            seen.borrow_mut().push(r.len());
            Ok(())
        });
        opt.optimize(&objective, &space(), 2, 3, AcquisitionFunction::default())
            .unwrap();
        drop(opt);
        assert_eq!(seen.into_inner(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn acquisition_without_initial_design_still_runs() {
        let result = optimizer(3)
            .optimize(&objective, &space(), 0, 3, AcquisitionFunction::default())
            .unwrap();
        assert_eq!(result.len(), 3);
        assert_eq!(result.trials[0].origin, TrialOrigin::Initial);
        assert!(optimizer(3)
            .optimize(&objective, &space(), 0, 0, AcquisitionFunction::default())
            .is_err());
    }

    #[test]
    fn resumed_search_continues_the_interrupted_one() {
        let full = optimizer(9)
            .optimize(&objective, &space(), 4, 2, AcquisitionFunction::default())
            .unwrap();

        let calls = Cell::new(0);
        let counting = |p: &HyperParameters| {
            calls.set(calls.get() + 1);
            objective(p)
        };
        let completed = SearchResult {
            trials: full.trials[..2].to_vec(),
        };
        let resumed = optimizer(9)
            .resume(&counting, &space(), completed, 4, 2, AcquisitionFunction::default())
            .unwrap();

        assert_eq!(calls.get(), 4);
        assert_eq!(resumed.len(), 6);
        assert_eq!(resumed.trials[..2], full.trials[..2]);
        for (a, b) in resumed.trials[..4].iter().zip(&full.trials[..4]) {
            assert_eq!(a.params, b.params);
        }
        let numbers: Vec<usize> = resumed.trials.iter().map(|t| t.trial_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(
            resumed.trials.iter().filter(|t| t.origin == TrialOrigin::Acquired).count(),
            2
        );
    }

    #[test]
    fn resume_past_the_design_only_runs_iterations() {
        let full = optimizer(10)
            .optimize(&objective, &space(), 2, 3, AcquisitionFunction::default())
            .unwrap();
        let completed = SearchResult {
            trials: full.trials[..3].to_vec(),
        };
        let resumed = optimizer(10)
            .resume(&objective, &space(), completed, 2, 3, AcquisitionFunction::default())
            .unwrap();
        assert_eq!(resumed.len(), 5);
        assert!(resumed.trials[3..].iter().all(|t| t.origin == TrialOrigin::Acquired));
    }

    #[test]
    fn resume_rejects_trials_that_do_not_fit() {
        let full = optimizer(11)
            .optimize(&objective, &space(), 3, 0, AcquisitionFunction::default())
            .unwrap();
        assert!(optimizer(11)
            .resume(&objective, &space(), full.clone(), 2, 0, AcquisitionFunction::default())
            .is_err());

        let narrow = SearchSpace::new().add_int("max_depth", 1, 2);
        assert!(optimizer(11)
            .resume(&objective, &narrow, full.clone(), 3, 1, AcquisitionFunction::default())
            .is_err());

        let mut shuffled = full;
        shuffled.trials.swap(0, 1);
        assert!(optimizer(11)
            .resume(&objective, &space(), shuffled, 3, 1, AcquisitionFunction::default())
            .is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn trials_never_leave_their_bounds(seed in any::<u64>(), init in 1usize..5, iters in 0usize..4) {
            let space = space();
            let result = optimizer(seed)
                .optimize(&objective, &space, init, iters, AcquisitionFunction::default())
                .unwrap();
            prop_assert_eq!(result.len(), init + iters);
            for trial in &result.trials {
                prop_assert!(space.check(&trial.params).is_ok());
                match trial.params.get("max_depth") {
                    Some(ParamValue::Int(depth)) => prop_assert!((1..=15).contains(&depth)),
                    other => prop_assert!(false, "max_depth was {:?}", other),
                }
            }
        }
    }
}
