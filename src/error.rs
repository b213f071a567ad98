//! Engine error taxonomy.
//!
//! Only `ValidationFault` (startup) and `Aggregate` (request) ever reach a caller;
//! the rest are absorbed at the fetch boundary and degrade to neutral inputs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    #[error("undefined ratio: {0}")]
    UndefinedRatio(&'static str),

    #[error("upstream fault from {source_name}: {message}")]
    UpstreamFault {
        source_name: String,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    ValidationFault(String),

    #[error("signal pipeline failed: {0}")]
    Aggregate(String),
}

impl EngineError {
    pub fn upstream(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        EngineError::UpstreamFault {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        EngineError::ValidationFault(msg.into())
    }
}
