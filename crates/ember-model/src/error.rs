use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    #[error("unknown cloud: {0}")]
    UnknownCloud(String),

    #[error("unknown gpu type: {0}")]
    UnknownGpu(String),

    #[error("invalid model: {0}")]
    Invalid(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
