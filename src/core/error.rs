use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeekgateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Usage(String),
    #[error("report serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} problem(s) found")]
    GateFailed(usize),
}
