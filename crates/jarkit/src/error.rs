//! Error types for jar deployment requests

use thiserror::Error;

/// Errors raised while validating or resolving a jar deployment
///
/// All of them abort the request. Validation errors are raised by
/// [`crate::JarParams::validate`]; only [`JarError::SourceResolution`] is
/// deferred to [`crate::JarRequest::resolve`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JarError {
    /// Two mutually exclusive parameters were both set
    #[error("Only one of ${first} and ${second} can be specified")]
    ParameterConflict {
        first: &'static str,
        second: &'static str,
    },

    /// A name is not a plain file name ending in `.jar`
    #[error("${field} {reason}, got '{value}' (used as $jar_name)")]
    NamingConvention {
        field: &'static str,
        reason: &'static str,
        value: String,
    },

    /// A parameter value is outside the domain of its type
    #[error("${field} expects a {expected} value, got {actual}")]
    TypeValidation {
        field: &'static str,
        expected: String,
        actual: String,
    },

    /// A parameter required by the chosen ensure state is missing
    #[error("${field} must be specified when {reason}")]
    MissingRequiredField {
        field: &'static str,
        reason: &'static str,
    },

    /// The source is neither an absolute local path nor a supported URL
    #[error("invalid source url '{source_url}': {reason}")]
    SourceResolution { source_url: String, reason: String },
}

impl JarError {
    /// Name of the parameter at fault
    pub fn field(&self) -> &'static str {
        match self {
            Self::ParameterConflict { first, .. } => first,
            Self::NamingConvention { .. } => "jar_name",
            Self::TypeValidation { field, .. } | Self::MissingRequiredField { field, .. } => field,
            Self::SourceResolution { .. } => "jar_source",
        }
    }

    /// Whether the error is raised at resolution rather than declaration time
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::SourceResolution { .. })
    }
}

/// Result type for jar deployment operations
pub type Result<T> = std::result::Result<T, JarError>;
