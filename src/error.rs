use thiserror::Error;

use crate::table::Stage;

/// Unified error type for every pipeline stage.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Errored while handling a file. {0}")]
    Io(#[from] std::io::Error),
    #[error("Error serializing json. {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Error reading the resource table. {0}")]
    Csv(#[from] csv::Error),
    #[error("Error compiling a pattern. {0}")]
    Regex(#[from] regex::Error),
    #[error("Linear algebra routine failed. {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
    #[error("Array shape error. {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("{0}")]
    Dir(#[from] vigilant_dev_dirs::DirError),
    #[error("Invalid resource link {0:?}: links must use http or https.")]
    InvalidUrl(String),
    #[error("The cluster strategy has not clustered any data yet.")]
    NotClustered,
    #[error("Need at least {required} samples, got {samples}.")]
    NotEnoughSamples { samples: usize, required: usize },
    #[error("Expected {expected} values, found {found}.")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Row {0} does not exist in the record table.")]
    UnknownRow(usize),
    #[error("Row {0} was given more than one value for the same column.")]
    DuplicateRow(usize),
    #[error("Stage {attempted} requires the table to be at least {required}, but it is {found}.")]
    InvalidStage {
        attempted: Stage,
        required: Stage,
        found: Stage,
    },
    #[error("Invalid configuration. {0}")]
    Config(String),
    #[error("Error while running the embedding model. {0}")]
    Embedding(String),
    #[error("Plot construction failed. {0}")]
    Plot(String),
    #[error("{0}")]
    Other(String),
}

/// Convenience alias for results that bubble `AppError`.
pub type AppResult<T> = Result<T, AppError>;
