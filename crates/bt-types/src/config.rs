//! Run configuration for a tuning session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config_error;
use crate::errors::BtResult;

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "BOOSTTUNE_CONFIG";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "BOOSTTUNE_DATA_DIR";

/// Top-level configuration for a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneConfig {
    pub name: String,

    /// Seed for partitioning, fold assignment, sampling and boosting.
    pub seed: u64,

    /// Fraction of records held out for the final threshold sweep.
    pub holdout_fraction: f64,

    /// Number of stratified cross-validation folds.
    pub folds: usize,

    /// Maximum boosting rounds per cross-validation run.
    pub max_rounds: usize,

    /// Rounds without improvement before a cross-validation run stops.
    pub early_stopping_rounds: usize,

    /// Configurations drawn before the surrogate takes over.
    pub init_points: usize,

    /// Surrogate-guided iterations after the initial design.
    pub n_iter: usize,

    /// Acquisition function: "ucb", "ei" or "poi".
    pub acquisition: String,

    /// Exploration weight for UCB.
    pub kappa: f64,

    /// Improvement margin for EI / PI.
    pub xi: f64,

    /// Where the raw dataset is stored (and fetched to when absent).
    pub data_dir: PathBuf,

    /// Where search and cross-validation artifacts are cached.
    pub cache_dir: PathBuf,

    pub dataset_url: String,

    pub created_at: DateTime<Utc>,
}

impl Default for TuneConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("boosttune");
        Self {
            name: "german_credit".to_string(),
            seed: 1234,
            holdout_fraction: 0.25,
            folds: 5,
            max_rounds: 1000,
            early_stopping_rounds: 20,
            init_points: 10,
            n_iter: 20,
            acquisition: "ucb".to_string(),
            kappa: 2.576,
            xi: 0.0,
            cache_dir: data_dir.join("cache"),
            data_dir,
            dataset_url:
                "https://archive.ics.uci.edu/ml/machine-learning-databases/statlog/german/german.data"
                    .to_string(),
            created_at: Utc::now(),
        }
    }
}

impl TuneConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_search_budget(mut self, init_points: usize, n_iter: usize) -> Self {
        self.init_points = init_points;
        self.n_iter = n_iter;
        self
    }

    pub fn with_rounds(mut self, max_rounds: usize, early_stopping_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self.early_stopping_rounds = early_stopping_rounds;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.cache_dir = dir.join("cache");
        self.data_dir = dir;
        self
    }

    /// Read a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> BtResult<Self> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> BtResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| config_error!("cannot read {}: {}", path.display(), e))?;
        serde_json::from_str(&raw).map_err(|e| config_error!("cannot parse {}: {}", path.display(), e))
    }

    /// Defaults, overridden by the file in `BOOSTTUNE_CONFIG` and then by
    /// `BOOSTTUNE_DATA_DIR`.
    pub fn from_env() -> BtResult<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::parse_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            config = config.with_data_dir(PathBuf::from(dir));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BtResult<()> {
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(config_error!(
                "holdout_fraction must be in (0, 1), got {}",
                self.holdout_fraction
            ));
        }
        if self.folds < 2 {
            return Err(config_error!("folds must be at least 2, got {}", self.folds));
        }
        if self.max_rounds == 0 {
            return Err(config_error!("max_rounds must be positive"));
        }
        if self.early_stopping_rounds == 0 {
            return Err(config_error!("early_stopping_rounds must be positive"));
        }
        if self.init_points == 0 {
            return Err(config_error!("init_points must be positive"));
        }
        if !matches!(self.acquisition.as_str(), "ucb" | "ei" | "poi") {
            return Err(config_error!(
                "unknown acquisition function '{}'",
                self.acquisition
            ));
        }
        if !self.kappa.is_finite() || self.kappa < 0.0 {
            return Err(config_error!("kappa must be a non-negative number"));
        }
        if !self.xi.is_finite() {
            return Err(config_error!("xi must be finite, got {}", self.xi));
        }
        Ok(())
    }
}
