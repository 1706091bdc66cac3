pub mod bio;
pub mod cli;
pub mod core;
pub mod report;
pub mod tools;
pub mod weights;

pub use crate::bio::sequence::NamedSequence;
pub use crate::core::dispatcher::JobDispatcher;
pub use crate::core::normalizer::SequenceNormalizer;
pub use crate::report::ResultAggregator;
pub use crate::weights::converter::WeightConverter;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UniRepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("Invalid model size: {0} (expected 64, 256 or 1900)")]
    InvalidModelSize(String),

    /// A custom weight bundle was built for a different model than the job declared
    #[error(
        "Weight bundle is for the {inferred}-dimensional model but the job declared {declared}; \
         the uploaded weights were probably made for another model size"
    )]
    WeightShapeMismatch { declared: usize, inferred: usize },

    #[error("Unreadable weight bundle: {0}")]
    WeightFormat(String),

    #[error("Model runtime failed: {0}")]
    ExternalRuntime(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, UniRepError>;

impl From<csv::Error> for UniRepError {
    fn from(err: csv::Error) -> Self {
        UniRepError::Parse(err.to_string())
    }
}

impl From<ndarray_npy::WriteNpyError> for UniRepError {
    fn from(err: ndarray_npy::WriteNpyError) -> Self {
        UniRepError::Other(format!("Failed to write array: {}", err))
    }
}
