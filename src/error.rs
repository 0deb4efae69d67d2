//! Error types for actionmap
//!
//! Library operations return [`Result`]. Callback-facing seams (monitor
//! callbacks, scenario loading) use `anyhow` so callers can attach context.

use thiserror::Error;

/// The main error type for input-system operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// Operation not valid in the current state (e.g. starting a rebind with nothing to bind)
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// A rebind or override was attempted while the action is enabled
    #[error("Action '{action}' must be disabled for this operation")]
    ActionEnabled { action: String },

    /// No interaction registered under this name
    #[error("Unknown interaction: {name}")]
    UnknownInteraction { name: String },

    /// An interaction parameter could not be parsed or is out of range
    #[error("Invalid parameter '{parameter}' for interaction '{interaction}': {message}")]
    InvalidInteractionParameter {
        interaction: String,
        parameter: String,
        message: String,
    },

    /// Binding or control path could not be parsed
    #[error("Invalid path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// No layout registered under this name
    #[error("Unknown layout: {layout}")]
    UnknownLayout { layout: String },

    #[error("Unknown device: {device}")]
    UnknownDevice { device: String },

    #[error("Unknown control: {control}")]
    UnknownControl { control: String },

    #[error("Unknown action: {action}")]
    UnknownAction { action: String },

    /// Synthetic controls have no storage of their own and cannot be written
    #[error("Control '{control}' is synthetic and cannot be written")]
    ReadOnlyControl { control: String },

    #[error("Invalid settings: {message}")]
    InvalidSettings { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Standard Result type for actionmap operations
pub type Result<T> = std::result::Result<T, InputError>;

impl InputError {
    /// Create an InvalidOperation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create an InvalidInteractionParameter error
    pub fn invalid_parameter(
        interaction: impl Into<String>,
        parameter: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidInteractionParameter {
            interaction: interaction.into(),
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidPath error
    pub fn invalid_path(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidSettings error
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }

    /// Whether this error is an invalid-operation condition
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperation { .. } | Self::ActionEnabled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = InputError::invalid_parameter("hold", "duration", "expected a number");
        assert_eq!(
            err.to_string(),
            "Invalid parameter 'duration' for interaction 'hold': expected a number"
        );

        let err = InputError::ActionEnabled {
            action: "fire".to_string(),
        };
        assert!(err.to_string().contains("fire"));
        assert!(err.is_invalid_operation());
    }

    #[test]
    fn test_invalid_operation_classification() {
        assert!(InputError::invalid_operation("no bindings").is_invalid_operation());
        assert!(!InputError::invalid_settings("bad").is_invalid_operation());
    }
}
