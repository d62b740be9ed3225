use thiserror::Error;

/// Main error type for the MyoSearch system
#[derive(Error, Debug)]
pub enum MyoError {
    #[error("Parameter error: {0}")]
    Param(#[from] ParamError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dimension error: {message}")]
    Dimension { message: String },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error in {path} line {line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Parameter-set errors
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("Duplicate parameter name: {name}")]
    DuplicateName { name: String },

    #[error("Invalid parameter-set mode for {operation}: set is already finalized")]
    InvalidMode { operation: String },

    #[error("Free-vector size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Unknown parameter: {name}")]
    UnknownName { name: String },
}

/// Result type alias for MyoSearch operations
pub type MyoResult<T> = Result<T, MyoError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::MyoError::Config(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::MyoError::Internal(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ParamError::SizeMismatch {
            expected: 12,
            actual: 7,
        };
        assert!(error.to_string().contains("expected 12"));
        assert!(error.to_string().contains("got 7"));
    }

    #[test]
    fn test_error_conversion() {
        let param_error = ParamError::DuplicateName {
            name: "knee.kp".to_string(),
        };
        let myo_error: MyoError = param_error.into();

        match myo_error {
            MyoError::Param(_) => (),
            _ => panic!("Expected Param error"),
        }
    }

    #[test]
    fn test_macros() {
        let _config_err = config_error!("Missing required field: {}", "max_generations");
        let _internal_err = internal_error!("Something went wrong");
    }
}
