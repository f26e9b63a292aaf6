//! Request validation errors.

use thiserror::Error;

/// A request or resource failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was missing or empty.
    #[error("missing required field '{0}'")]
    MissingField(String),

    /// A resource name is not a valid DNS-1123 label.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// What rule was broken.
        reason: String,
    },

    /// A field value was outside its allowed range or set.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue {
        /// Field name (camelCase, as on the wire).
        field: String,
        /// Description.
        message: String,
    },

    /// A path escaped its root or contained forbidden segments.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// Offending path.
        path: String,
        /// What rule was broken.
        reason: String,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`ValidationError::MissingField`].
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }
}
