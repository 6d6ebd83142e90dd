//! # bt-optimizer
//!
//! Bayesian hyperparameter search for BoostTune.
//!
//! Provides space-filling initial designs, a Gaussian-process surrogate,
//! acquisition functions (UCB, EI, PI), the append-only trial log, and the
//! driver that ties them to a `ModelEvaluator`.

mod acquisition;
mod driver;
mod sampler;
mod surrogate;
mod trial;

pub use acquisition::AcquisitionFunction;
pub use driver::{BayesianOptimizer, OptimizerSettings, TrialObserver};
pub use sampler::{DesignKind, InitialDesign, LatinHypercube, UniformSampler};
pub use surrogate::{GaussianProcess, Surrogate};
pub use trial::{SearchResult, TrialOrigin, TrialRecord};
