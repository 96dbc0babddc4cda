//! Error types for `openapi-mcp-index`.

use serde_json::Value;
use thiserror::Error;

/// Failure to fetch or decode the source document.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file format: '{extension}' ({path}). Only .json, .yaml, .yml are supported.")]
    UnsupportedFormat { path: String, extension: String },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Invalid JSON format in '{location}': {source}")]
    InvalidJson {
        location: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid YAML format in '{location}': {source}")]
    InvalidYaml {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid document in '{location}': expected an object, found {found}")]
    NotAnObject { location: String, found: &'static str },

    #[error("HTTP error {status}: {reason} ({url})")]
    HttpStatus {
        url: String,
        status: u16,
        reason: String,
    },

    #[error("Host not found: {url}")]
    HostNotFound { url: String },

    #[error("Connection refused: {url}")]
    ConnectionRefused { url: String },

    #[error("Request timeout: {url}")]
    Timeout { url: String },

    #[error("Network error ({url}): {message}")]
    Network { url: String, message: String },

    #[error("Response too large ({url}): {message}")]
    ResponseTooLarge { url: String, message: String },
}

/// The decoded tree cannot be treated as a document container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to parse OpenAPI document: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The document lacks the minimum identity needed to index it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("Failed to index OpenAPI document: missing info.title")]
    MissingTitle,

    #[error("Failed to index OpenAPI document: missing info.version")]
    MissingVersion,
}

/// Main error type for `openapi-mcp-index`.
#[derive(Error, Debug)]
pub enum OpenApiIndexError {
    /// Configuration errors (invalid config file, missing fields, conflicts).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source document could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Spec hash mismatch. Expected: {expected}, Got: {actual}")]
    SpecHashMismatch { expected: String, actual: String },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Index(#[from] IndexError),

    /// The caller named an operation that is not registered.
    #[error("Tool not found: {0}")]
    OperationNotFound(String),

    /// Arguments rejected by the operation's input shape.
    ///
    /// `data` carries the individual violations for the caller.
    #[error("{message}")]
    InvalidArguments { message: String, data: Value },

    /// A registered operation failed (including not-found lookups).
    #[error("{0}")]
    ToolExecution(String),
}

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, OpenApiIndexError>;
