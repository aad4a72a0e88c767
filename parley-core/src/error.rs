use std::collections::TryReserveError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors produced by parley-core.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("malformed context: {0}")]
    MalformedContext(String),

    #[error("model load error: {0}")]
    ModelLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

impl ParleyError {
    /// Collapse the error into the four-value status taxonomy exposed to hosts.
    pub fn status(&self) -> Status {
        match self {
            ParleyError::InvalidArgument(_) | ParleyError::MalformedContext(_) => {
                Status::InvalidArgument
            }
            ParleyError::InvalidState(_) => Status::InvalidState,
            ParleyError::ModelLoad(_) | ParleyError::Io(_) => Status::IoError,
            ParleyError::OutOfMemory(_) => Status::OutOfMemory,
        }
    }
}

impl From<TryReserveError> for ParleyError {
    fn from(e: TryReserveError) -> Self {
        ParleyError::OutOfMemory(e.to_string())
    }
}

/// Status code reported across the host boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    InvalidArgument,
    InvalidState,
    IoError,
    OutOfMemory,
}

pub type Result<T> = std::result::Result<T, ParleyError>;
