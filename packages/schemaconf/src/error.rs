//! Error types for schema-driven configuration loading
//!
//! The taxonomy keeps the failure domains apart: a [`Schema`](ConfigError::Schema)
//! error means the schema definition itself is invalid, a
//! [`Configuration`](ConfigError::Configuration) error means the config text is
//! structurally wrong for the schema, a [`Syntax`](ConfigError::Syntax) error
//! means the text could not be tokenized at all, and a
//! [`Conversion`](ConfigError::Conversion) error means a raw value was rejected
//! by its datatype. Conversion errors surface at finish time but carry the
//! position where the value was originally read.
//!
//! All errors abort the load; there is no partial result.

use crate::types::Position;
use thiserror::Error;

/// Errors that can occur while building schemas or loading configurations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The schema definition itself is invalid
    #[error("schema error: {message}")]
    Schema {
        /// What is wrong with the schema
        message: String,
    },

    /// The configuration is structurally invalid for the schema
    #[error("{message}{}", position_suffix(.position))]
    Configuration {
        /// What constraint was violated
        message: String,
        /// Where in the config text, when known
        position: Option<Position>,
    },

    /// The configuration text is not syntactically well-formed
    #[error("{message} (line {line}{})", url_suffix(.url))]
    Syntax {
        /// What could not be tokenized
        message: String,
        /// Resource being parsed, when known
        url: Option<String>,
        /// Line the error was detected on
        line: u64,
    },

    /// A raw value was rejected by its datatype conversion
    #[error("{message} (value {value:?}, {position})")]
    Conversion {
        /// Rejection message from the conversion
        message: String,
        /// The raw text that failed to convert
        value: String,
        /// Where the value was originally read
        position: Position,
    },

    /// `$name` interpolation failed
    #[error("substitution error: {message}{}", line_url_suffix(.line, .url))]
    Substitution {
        /// What went wrong during interpolation
        message: String,
        /// Resource being parsed, when known
        url: Option<String>,
        /// Line the value appeared on, when known
        line: Option<u64>,
    },

    /// An included file or imported schema component could not be resolved
    #[error("resource error: {message}{}", url_suffix(.url))]
    Resource {
        /// What could not be resolved
        message: String,
        /// The reference that failed, when known
        url: Option<String>,
    },

    /// IO error from file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Schema-definition error.
    pub fn schema(message: impl Into<String>) -> Self {
        ConfigError::Schema {
            message: message.into(),
        }
    }

    /// Structural configuration error without a known position.
    pub fn configuration(message: impl Into<String>) -> Self {
        ConfigError::Configuration {
            message: message.into(),
            position: None,
        }
    }

    /// Structural configuration error at a known position.
    pub fn configuration_at(message: impl Into<String>, position: Position) -> Self {
        ConfigError::Configuration {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Conversion failure for a raw value at its intake position.
    pub fn conversion(message: impl Into<String>, value: impl Into<String>, position: Position) -> Self {
        ConfigError::Conversion {
            message: message.into(),
            value: value.into(),
            position,
        }
    }

    /// Resource resolution failure.
    pub fn resource(message: impl Into<String>, url: Option<String>) -> Self {
        ConfigError::Resource {
            message: message.into(),
            url,
        }
    }

    /// Fill in the position of a positionless structural error.
    ///
    /// Used by the parser, which knows the current line while the matcher
    /// does not. Errors that already carry a position keep it.
    pub(crate) fn at(self, position: Position) -> Self {
        match self {
            ConfigError::Configuration {
                message,
                position: None,
            } => ConfigError::Configuration {
                message,
                position: Some(position),
            },
            other => other,
        }
    }
}

fn position_suffix(position: &Option<Position>) -> String {
    match position {
        Some(p) if p.is_known() => format!(" ({})", p),
        _ => String::new(),
    }
}

fn url_suffix(url: &Option<String>) -> String {
    match url {
        Some(url) => format!(", in {}", url),
        None => String::new(),
    }
}

fn line_url_suffix(line: &Option<u64>, url: &Option<String>) -> String {
    match (line, url) {
        (Some(line), Some(url)) => format!(" (line {}, in {})", line, url),
        (Some(line), None) => format!(" (line {})", line),
        (None, Some(url)) => format!(" (in {})", url),
        (None, None) => String::new(),
    }
}

/// Result type alias using ConfigError
pub type Result<T> = std::result::Result<T, ConfigError>;
