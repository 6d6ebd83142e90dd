// BoostTune tuning pipeline: dataset to tuned model to holdout report

pub mod pipeline;

pub use pipeline::{credit_search_space, TuningOutcome, TuningPipeline, SEARCH_CHECKPOINT_KEY};
