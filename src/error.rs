use thiserror::Error;

/// Error types for the lmdif-batch library.
#[derive(Error, Debug)]
pub enum LmError {
    /// Error indicating a mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid solver configuration or problem shape.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error for invalid parameter values.
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    /// Error during function evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// The residual callback asked to stop with the given (negative) status.
    #[error("Evaluation aborted with status {0}")]
    Aborted(i32),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Generic error for cases that don't fit the other categories.
    #[error("Error: {0}")]
    Other(String),
}

impl LmError {
    /// The negative termination code this error maps to when it escapes a
    /// residual callback.
    ///
    /// `Aborted` keeps its own status (forced negative); everything else is `-1`.
    pub fn abort_status(&self) -> i32 {
        match self {
            LmError::Aborted(status) if *status < 0 => *status,
            LmError::Aborted(0) => -1,
            LmError::Aborted(status) => -status.saturating_abs(),
            _ => -1,
        }
    }
}

/// Result type alias for lmdif-batch operations.
pub type Result<T> = std::result::Result<T, LmError>;

impl From<String> for LmError {
    fn from(s: String) -> Self {
        LmError::Other(s)
    }
}

impl From<&str> for LmError {
    fn from(s: &str) -> Self {
        LmError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LmError::DimensionMismatch("expected 5 parameters, got 4".to_string());
        assert!(format!("{}", err).contains("expected 5 parameters, got 4"));

        let err = LmError::Aborted(-3);
        assert!(format!("{}", err).contains("-3"));
    }

    #[test]
    fn test_abort_status() {
        assert_eq!(LmError::Aborted(-7).abort_status(), -7);
        assert_eq!(LmError::Aborted(4).abort_status(), -4);
        assert_eq!(LmError::Aborted(0).abort_status(), -1);
        assert_eq!(
            LmError::FunctionEvaluation("nan".to_string()).abort_status(),
            -1
        );
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: LmError = json_err.into();
        match err {
            LmError::JsonError(_) => (),
            _ => panic!("Expected JsonError variant"),
        }

        let str_err: LmError = "test error".into();
        match str_err {
            LmError::Other(s) => assert_eq!(s, "test error"),
            _ => panic!("Expected Other variant"),
        }
    }
}
