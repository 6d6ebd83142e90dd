use std::fmt;

use bt_data::{
    stratified_folds, stratified_partition, CacheOutcome, DataManager, FeatureEncoder,
    ResultCache, FINAL_CV_KEY, SEARCH_RESULT_KEY,
};
use bt_model::{CvEvaluator, CvSettings};
use bt_optimizer::{AcquisitionFunction, BayesianOptimizer, OptimizerSettings, SearchResult};
use bt_report::{threshold_grid, HoldoutReport};
use bt_types::{
    internal_error, BtResult, Dataset, EvaluationResult, HyperParameters, ModelEvaluator,
    SearchSpace, TuneConfig,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Partial search log, rewritten after every trial and removed once the
/// search completes. A search that finds one picks up where it left off.
pub const SEARCH_CHECKPOINT_KEY: &str = "search_checkpoint";

/// Bounds searched for the credit-risk booster.
pub fn credit_search_space() -> SearchSpace {
    SearchSpace::new()
        .add_int("max_depth", 1, 15)
        .add_float("eta", 0.01, 0.3)
        .add_float("min_child_weight", 1.0, 10.0)
        .add_float("subsample", 0.5, 1.0)
        .add_float("colsample_bytree", 0.5, 1.0)
        .add_float("gamma", 0.0, 5.0)
}

/// Everything a tuning run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningOutcome {
    pub search: SearchResult,
    pub best_params: HyperParameters,
    pub final_cv: EvaluationResult,
    pub report: HoldoutReport,
    pub search_reused: bool,
    pub final_cv_reused: bool,
}

impl fmt::Display for TuningOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Search: {} trials{}",
            self.search.len(),
            if self.search_reused { " (cached)" } else { "" }
        )?;
        writeln!(f, "Best configuration: {}", self.best_params)?;
        writeln!(
            f,
            "Cross-validated AUC: {:.4} at round {}{}",
            self.final_cv.score,
            self.final_cv.best_round,
            if self.final_cv_reused { " (cached)" } else { "" }
        )?;
        writeln!(f)?;
        write!(f, "{}", self.report)
    }
}

/// Orchestrates load, split, search, final fit and holdout report.
#[derive(Debug)]
pub struct TuningPipeline {
    config: TuneConfig,
    cache: ResultCache,
}

impl TuningPipeline {
    pub fn new(config: TuneConfig) -> BtResult<Self> {
        config.validate()?;
        let cache = ResultCache::new(&config.cache_dir)?;
        Ok(Self { config, cache })
    }

    pub fn config(&self) -> &TuneConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Fetch the German Credit data if needed and run the full workflow.
    pub async fn run(&self) -> BtResult<TuningOutcome> {
        info!("Starting tuning run '{}'", self.config.name);
        let manager = DataManager::german_credit(&self.config.data_dir, &self.config.dataset_url)?;
        let dataset = manager.load().await?;
        self.run_on(&dataset)
    }

    /// Run the workflow on an already-loaded dataset.
    pub fn run_on(&self, dataset: &Dataset) -> BtResult<TuningOutcome> {
        let config = &self.config;

        let partition = stratified_partition(&dataset.labels(), config.holdout_fraction, config.seed)?;
        let design = FeatureEncoder::from_schema(dataset.schema()).transform(dataset)?;
        let train = design.select_rows(&partition.train);
        let holdout = design.select_rows(&partition.holdout);
        info!(
            "Split {} records into {} training and {} holdout ({} encoded columns)",
            dataset.len(),
            train.n_rows(),
            holdout.n_rows(),
            design.n_columns()
        );

        let folds = stratified_folds(&train.labels, config.folds, config.seed)?;
        let space = credit_search_space();
        let settings = CvSettings {
            max_rounds: config.max_rounds,
            early_stopping_rounds: config.early_stopping_rounds,
            seed: config.seed,
            keep_oof: false,
        };
        let evaluator = CvEvaluator::new(train.clone(), folds.clone(), space.clone(), settings)?;

        let (search, search_source) = self
            .cache
            .get_or_compute(SEARCH_RESULT_KEY, || self.search(&evaluator, &space))?;
        let best = search
            .best()
            .ok_or_else(|| internal_error!("search result holds no trials"))?;
        let best_params = best.params.clone();
        info!("Best configuration (trial {}): {}", best.trial_number, best_params);

        let final_evaluator = CvEvaluator::new(
            train,
            folds,
            space,
            CvSettings {
                keep_oof: true,
                ..settings
            },
        )?;
        let (final_cv, final_source) = self
            .cache
            .get_or_compute(FINAL_CV_KEY, || final_evaluator.evaluate(&best_params))?;
        info!(
            "Final cross-validation AUC {:.4} at round {}",
            final_cv.score, final_cv.best_round
        );

        let model = final_evaluator.train_final(&best_params, final_cv.best_round.max(1))?;
        let probabilities = model.predict_proba(&holdout.features);
        let report = HoldoutReport::build(&probabilities, &holdout.labels, &threshold_grid())?;

        let stats = self.cache.get_stats();
        info!(
            "Cache: {} hits, {} misses, {} stores (hit rate {:.2})",
            stats.hits,
            stats.misses,
            stats.stores,
            stats.hit_rate()
        );

        Ok(TuningOutcome {
            search,
            best_params,
            final_cv,
            report,
            search_reused: search_source == CacheOutcome::Hit,
            final_cv_reused: final_source == CacheOutcome::Hit,
        })
    }

    fn search<E: ModelEvaluator>(&self, evaluator: &E, space: &SearchSpace) -> BtResult<SearchResult> {
        let config = &self.config;
        let acquisition = AcquisitionFunction::from_name(&config.acquisition, config.kappa, config.xi)?;
        let mut optimizer = BayesianOptimizer::new(OptimizerSettings::default().with_seed(config.seed))
            .with_observer(|partial: &SearchResult| self.cache.store(SEARCH_CHECKPOINT_KEY, partial));

        let completed: SearchResult = self
            .cache
            .load_if_present(SEARCH_CHECKPOINT_KEY)?
            .unwrap_or_default();
        if !completed.is_empty() {
            info!("Resuming search after {} checkpointed trials", completed.len());
        }

        let result = optimizer.resume(
            evaluator,
            space,
            completed,
            config.init_points,
            config.n_iter,
            acquisition,
        )?;
        self.cache.remove(SEARCH_CHECKPOINT_KEY)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bt_optimizer::{TrialOrigin, TrialRecord};
    use bt_types::{BtError, DataError, FieldValue, ParamValue, Schema};
    use tempfile::tempdir;

    /// 90 records whose outcome follows `account` and, more loosely, `amount`.
    fn dataset() -> Dataset {
        let schema = Schema::new("risk", "bad")
            .categorical("account", vec!["A11", "A12", "A13"])
            .integer("amount")
            .categorical("risk", vec!["good", "bad"]);
        let records = (0..90)
            .map(|i| {
                let bad = i % 3 == 0;
                let account = if bad { ["A11", "A12"][i % 2] } else { ["A12", "A13"][i % 2] };
                let amount = if bad { 4000 + (i * 37) % 3000 } else { 1000 + (i * 53) % 3000 };
                vec![
                    FieldValue::Level(account.to_string()),
                    FieldValue::Int(amount as i64),
                    FieldValue::Level(if bad { "bad" } else { "good" }.to_string()),
                ]
            })
            .collect();
        Dataset::new(schema, records).unwrap()
    }

    fn config(dir: &std::path::Path) -> TuneConfig {
        let mut config = TuneConfig::new("test")
            .with_seed(11)
            .with_search_budget(2, 1)
            .with_rounds(8, 3)
            .with_data_dir(dir);
        config.folds = 3;
        config
    }

    #[test]
    fn search_space_matches_booster_parameters() {
        let space = credit_search_space();
        assert!(space.validate().is_ok());
        assert_eq!(space.dimension(), 6);
        assert_eq!(
            space.get("max_depth").map(|p| p.kind.bounds()),
            Some((1.0, 15.0))
        );
    }

    #[test]
    fn end_to_end_run_produces_report() {
        let dir = tempdir().unwrap();
        let pipeline = TuningPipeline::new(config(dir.path())).unwrap();
        let outcome = pipeline.run_on(&dataset()).unwrap();

        assert_eq!(outcome.search.len(), 3);
        assert!(!outcome.search_reused);
        assert!(!outcome.final_cv_reused);
        assert!(credit_search_space().check(&outcome.best_params).is_ok());
        assert!(outcome.final_cv.oof_predictions.is_some());
        assert!(outcome.report.matrix.total() > 0);
        assert!(pipeline.cache().contains(SEARCH_RESULT_KEY));
        assert!(pipeline.cache().contains(FINAL_CV_KEY));
        assert!(!pipeline.cache().contains(SEARCH_CHECKPOINT_KEY));
        assert!(outcome.to_string().contains("Best configuration"));
    }

    #[test]
    fn cached_search_skips_the_optimizer() {
        let dir = tempdir().unwrap();
        let pipeline = TuningPipeline::new(config(dir.path())).unwrap();

        let params = HyperParameters::new()
            .with("max_depth", ParamValue::Int(2))
            .with("eta", ParamValue::Float(0.2))
            .with("min_child_weight", ParamValue::Float(1.0))
            .with("subsample", ParamValue::Float(1.0))
            .with("colsample_bytree", ParamValue::Float(1.0))
            .with("gamma", ParamValue::Float(0.0));
        let mut cached = SearchResult::new();
        cached.push(TrialRecord::new(
            1,
            params.clone(),
            EvaluationResult::from_score(0.99),
            TrialOrigin::Initial,
            0,
        ));
        pipeline.cache().store(SEARCH_RESULT_KEY, &cached).unwrap();

        let outcome = pipeline.run_on(&dataset()).unwrap();
        assert!(outcome.search_reused);
        assert_eq!(outcome.search, cached);
        assert_eq!(outcome.best_params, params);
        assert!(!pipeline.cache().contains(SEARCH_CHECKPOINT_KEY));

        let again = pipeline.run_on(&dataset()).unwrap();
        assert!(again.search_reused && again.final_cv_reused);
        assert_eq!(again.final_cv, outcome.final_cv);
    }

    #[test]
    fn checkpointed_trials_are_resumed() {
        let dir = tempdir().unwrap();
        let pipeline = TuningPipeline::new(config(dir.path())).unwrap();

        let params = HyperParameters::new()
            .with("max_depth", ParamValue::Int(3))
            .with("eta", ParamValue::Float(0.3 / 7.0))
            .with("min_child_weight", ParamValue::Float(2.5))
            .with("subsample", ParamValue::Float(0.9))
            .with("colsample_bytree", ParamValue::Float(0.8))
            .with("gamma", ParamValue::Float(0.1));
        let mut checkpoint = SearchResult::new();
        checkpoint.push(TrialRecord::new(
            1,
            params.clone(),
            EvaluationResult::from_score(1.0),
            TrialOrigin::Initial,
            0,
        ));
        pipeline.cache().store(SEARCH_CHECKPOINT_KEY, &checkpoint).unwrap();

        let outcome = pipeline.run_on(&dataset()).unwrap();
        assert!(!outcome.search_reused);
        assert_eq!(outcome.search.len(), 3);
        assert_eq!(outcome.search.trials[0], checkpoint.trials[0]);
        assert_eq!(outcome.best_params, params);
        assert!(!pipeline.cache().contains(SEARCH_CHECKPOINT_KEY));
    }

    #[test]
    fn stored_search_reloads_exactly() {
        let dir = tempdir().unwrap();
        let pipeline = TuningPipeline::new(config(dir.path())).unwrap();
        let outcome = pipeline.run_on(&dataset()).unwrap();

        let reloaded: SearchResult = pipeline
            .cache()
            .load_if_present(SEARCH_RESULT_KEY)
            .unwrap()
            .unwrap();
        assert_eq!(reloaded, outcome.search);
        assert_eq!(reloaded.best().map(|t| &t.params), Some(&outcome.best_params));
    }

    #[tokio::test]
    async fn missing_dataset_without_network_fails() {
        let dir = tempdir().unwrap();
        let mut config = config(dir.path());
        config.dataset_url = "http://127.0.0.1:1/german.data".to_string();
        let pipeline = TuningPipeline::new(config).unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, BtError::Data(DataError::FetchFailed { .. })));
    }
}
