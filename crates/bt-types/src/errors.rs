use thiserror::Error;

/// Main error type for the BoostTune system
#[derive(Error, Debug)]
pub enum BtError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Tuning error: {0}")]
    Tune(#[from] TuneError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl BtError {
    /// Follow evaluator wrappers down to the error the evaluator itself raised.
    pub fn root_cause(&self) -> &BtError {
        match self {
            BtError::Tune(TuneError::Evaluator { source, .. }) => source.root_cause(),
            other => other,
        }
    }
}

/// Dataset-related errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data source not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Unknown level '{value}' for categorical field {field}")]
    UnknownLevel { field: String, value: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },

    #[error("Fetching {url} failed: {message}")]
    FetchFailed { url: String, message: String },
}

/// Errors raised while evaluating, searching or caching tuning results
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Invalid configuration for parameter {parameter}: {message}")]
    ConfigurationInvalid { parameter: String, message: String },

    #[error("Training diverged at round {round}: {message}")]
    TrainingDivergence { round: usize, message: String },

    #[error("Empty search space: {message}")]
    EmptySearchSpace { message: String },

    #[error("Cached artifact {key} is corrupt: {message}")]
    CacheCorrupt { key: String, message: String },

    #[error("Evaluation of trial {trial} failed: {source}")]
    Evaluator {
        trial: usize,
        #[source]
        source: Box<BtError>,
    },
}

/// Result type alias for BoostTune operations
pub type BtResult<T> = Result<T, BtError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::BtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::BtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::BtError::Config(format!($($arg)*))
    };
}
