use serde::{Deserialize, Serialize};
use std::fmt;

pub const INVALID_FILTER: &str = "INVALID_FILTER";

/// Single structured error shape shared by the engine, the data adapters and callers.
///
/// Filter problems use the `INVALID_FILTER` code so the boundary can turn them into an
/// explicit "insufficient input" answer instead of a failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::new(INVALID_FILTER, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn is_invalid_filter(&self) -> bool {
        self.code == INVALID_FILTER
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
