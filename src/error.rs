use thiserror::Error;

/// Error type shared by every automation layer.
///
/// `Cancelled` is the hard-stop signal raised by `RunControl::checkpoint`. It is
/// propagated with `?` through every layer so the batch runner has a single
/// "stopped" exit, no matter how deep the worker was when the stop arrived.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    #[error("stopped by user")]
    Cancelled,

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("screen error: {0}")]
    Screen(String),

    #[error("environment error: {0}")]
    Environment(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AutomationError::Cancelled)
    }
}

pub type AutomationResult<T> = Result<T, AutomationError>;
