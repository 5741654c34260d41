use std::{io, result};

use burn::{config::ConfigError, record::RecorderError};

use crate::loss::TaskType;

pub type Result<T> = result::Result<T, Error>;

/// Every failure the controller and its collaborators report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hyperparameter violates its constraint. Raised at construction.
    #[error("fill in correct {field} ({expected})")]
    Config {
        field: &'static str,
        expected: String,
    },

    #[error("invalid dataset: {0}")]
    Data(String),

    #[error("loss `{name}` cannot be used for a {task} task")]
    Loss { name: String, task: TaskType },

    #[error("no predictor available, call fit or load_model first")]
    NotBuilt,

    /// Saved weights do not match the configuration they are loaded with.
    #[error("failed to load predictor: {0}")]
    Load(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to read predictor config: {0:?}")]
    PredictorConfig(ConfigError),

    #[error("checkpoint error: {0:?}")]
    Checkpoint(RecorderError),

    #[error("malformed dataset descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl Error {
    pub fn config(field: &'static str, expected: impl Into<String>) -> Self {
        Error::Config {
            field,
            expected: expected.into(),
        }
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::PredictorConfig(e)
    }
}

impl From<RecorderError> for Error {
    fn from(e: RecorderError) -> Self {
        Error::Checkpoint(e)
    }
}
