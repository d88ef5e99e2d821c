//! Crate-wide error types.
//!
//! Only orchestrator-level failures surface through these variants. Per-item
//! sink rejections, sampling misses, and checkpoint I/O problems are absorbed
//! into counters and logs rather than propagated.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
