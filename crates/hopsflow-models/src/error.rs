//! Error types for the `hopsflow-models` crate.
//!
//! All fallible constructors and `FromStr` implementations in this crate
//! return variants of [`ModelError`].

/// Errors produced when constructing or validating model types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// An API key name prefix was empty or contained invalid characters.
    #[error("invalid API key prefix \"{value}\": {reason}")]
    InvalidKeyPrefix {
        /// The value that failed validation.
        value: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// An API key name did not have the `<prefix>_<24 hex>` shape.
    #[error("invalid API key name \"{value}\": {reason}")]
    InvalidKeyName {
        /// The value that failed validation.
        value: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// A scope label is not one the platform knows.
    #[error("unknown API key scope \"{value}\"")]
    UnknownScope {
        /// The value that failed validation.
        value: String,
    },

    /// A file mode was not an octal number in `0..=0o7777`.
    #[error("invalid file mode \"{value}\": {reason}")]
    InvalidFileMode {
        /// The value that failed validation.
        value: String,
        /// Human-readable explanation.
        reason: String,
    },

    /// A required field was empty.
    #[error("missing required field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },
}
