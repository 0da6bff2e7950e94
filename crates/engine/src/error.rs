#![forbid(unsafe_code)]

use tb_storage::StoreError;

#[derive(Debug)]
pub enum EngineError {
    NotFound,
    StageNotFound(String),
    Validation(String),
    Contention { attempts: u32 },
    Store(StoreError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "task not found"),
            Self::StageNotFound(id) => write!(f, "stage not found: {id}"),
            Self::Validation(message) => write!(f, "invalid input: {message}"),
            Self::Contention { attempts } => {
                write!(f, "update contention after {attempts} attempts, retry the operation")
            }
            Self::Store(err) => write!(f, "store: {err}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::UnknownId => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::Validation(message.into())
}
