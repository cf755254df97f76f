//! Error types for compatsuite

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using CompatError
pub type Result<T> = std::result::Result<T, CompatError>;

/// Main error type for compatsuite operations
///
/// Only run-fatal conditions are represented here. Failures of individual
/// tasks are data, not errors, and never travel through this type.
#[derive(Debug, Error)]
pub enum CompatError {
    /// Project index could not be loaded or failed validation
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Filter expression could not be compiled
    #[error(transparent)]
    Predicate(#[from] PredicateError),

    /// Run configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Errors raised while loading the project index
#[derive(Debug, Error)]
pub enum LoadError {
    /// Index file could not be read
    #[error("Failed to read project index {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Index is not well-formed JSON or does not match the schema
    #[error("Failed to parse project index: {0}")]
    Parse(String),

    /// Two projects share the same path
    #[error("Duplicate project path '{path}' (entries {first} and {second})")]
    DuplicatePath {
        path: String,
        first: usize,
        second: usize,
    },

    /// A required field is absent or empty
    #[error("Project '{project}': missing required field '{field}'")]
    MissingField { project: String, field: String },

    /// The action tag is not one of the known kinds
    #[error("Project '{project}': unknown action '{action}' in field '{field}'")]
    UnknownAction {
        project: String,
        field: String,
        action: String,
    },

    /// Platform outside {Darwin, Linux, Windows}
    #[error("Project '{project}': unknown platform '{platform}' in field '{field}'")]
    UnknownPlatform {
        project: String,
        field: String,
        platform: String,
    },

    /// A project declares no compatibility entries
    #[error("Project '{project}': 'compatibility' must not be empty")]
    EmptyCompatibility { project: String },

    /// Commit is not a full SHA
    #[error("Project '{project}': field '{field}' must be a 40 character SHA, got '{commit}'")]
    InvalidCommit {
        project: String,
        field: String,
        commit: String,
    },

    /// Two compatibility entries name the same version
    #[error("Project '{project}': duplicate compatibility version '{version}'")]
    DuplicateVersion { project: String, version: String },

    /// Field holds a value of the wrong shape
    #[error("Project '{project}': invalid field '{field}': {message}")]
    InvalidField {
        project: String,
        field: String,
        message: String,
    },
}

/// Errors raised while compiling a filter expression
#[derive(Debug, Error, PartialEq)]
pub enum PredicateError {
    /// Character that starts no token
    #[error("Unexpected character '{ch}' at offset {offset} in '{expr}'")]
    UnexpectedChar { expr: String, ch: char, offset: usize },

    /// String literal without closing quote
    #[error("Unterminated string literal starting at offset {offset} in '{expr}'")]
    UnterminatedString { expr: String, offset: usize },

    /// Token that does not fit the grammar
    #[error("Unexpected '{found}' at offset {offset} in '{expr}', expected {expected}")]
    UnexpectedToken {
        expr: String,
        found: String,
        offset: usize,
        expected: String,
    },

    /// Expression ended early
    #[error("Unexpected end of expression '{expr}', expected {expected}")]
    UnexpectedEnd { expr: String, expected: String },

    /// Reference to an attribute tasks never carry
    #[error("Unknown attribute '{name}' in '{expr}' (known: {known})")]
    UnknownAttribute {
        expr: String,
        name: String,
        known: String,
    },

    /// Method outside the supported set
    #[error("Unknown method '{name}' in '{expr}' (supported: startswith, endswith)")]
    UnknownMethod { expr: String, name: String },

    /// Operand types do not fit the operator
    #[error("Type error in '{expr}': {message}")]
    TypeMismatch { expr: String, message: String },

    /// Nesting beyond what the evaluator accepts
    #[error("Expression nests deeper than {limit} levels: '{expr}'")]
    TooDeep { expr: String, limit: usize },

    /// Whole expression does not produce a boolean
    #[error("Expression '{expr}' must evaluate to a boolean, found {found}")]
    NotBoolean { expr: String, found: String },
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

impl CompatError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_names_project_and_field() {
        let err: CompatError = LoadError::MissingField {
            project: "Alamofire".to_string(),
            field: "compatibility[0].commit".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("Alamofire"));
        assert!(msg.contains("compatibility[0].commit"));
    }

    #[test]
    fn test_predicate_error_is_transparent() {
        let err: CompatError = PredicateError::UnknownMethod {
            expr: "path.lower()".to_string(),
            name: "lower".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("Unknown method 'lower'"));
    }
}
