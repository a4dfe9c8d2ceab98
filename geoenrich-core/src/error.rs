//! Error types for the geoenrich core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering transport, feature configuration, response traversal, tabular
//! input and configuration loading.
//!
//! "No data" is not an error: calculators and features report it as `None`.

/// Top-level error type for the geoenrich core library.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the remote enrichment client (transport layer).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request to '{endpoint}' failed: {message}")]
    Request { endpoint: String, message: String },

    #[error("Endpoint '{endpoint}' returned HTTP {status}: {body}")]
    HttpStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Could not decode response from '{endpoint}': {message}")]
    Decode { endpoint: String, message: String },

    #[error("API token not configured (set {env_var} or client.api_token)")]
    MissingToken { env_var: String },

    #[error("Invalid base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("Unknown endpoint: {name}")]
    UnknownEndpoint { name: String },
}

/// Errors from feature definitions and their evaluation against a response.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Key '{key}' not found while traversing path {path:?}")]
    KeyPath { path: Vec<String>, key: String },

    #[error("Cannot index {found} by key '{key}'")]
    NotIndexable { key: String, found: String },

    #[error("Expected a list of records before key '{key}'")]
    NotASequence { key: String },

    #[error("Unsupported aggregation mode: {mode}")]
    UnsupportedAggregation { mode: String },

    #[error("Values under '{key}' have no natural ordering")]
    Incomparable { key: String },

    #[error("Invalid feature '{feature}': {message}")]
    Validation { feature: String, message: String },
}

impl FeatureError {
    pub(crate) fn validation(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            feature: feature.into(),
            message: message.into(),
        }
    }
}

/// Errors from tabular input and output.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error(
        "No coordinate source: table has no point geometry and latitude/longitude columns were not both given"
    )]
    MissingCoordinateSource,

    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Row {row}: column '{column}' is not a valid coordinate")]
    InvalidCoordinate { row: usize, column: String },

    #[error("Row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Column '{column}' has {found} values, expected one per row ({expected})")]
    ColumnLength {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Geometry has {found} points, expected one per row ({expected})")]
    GeometryLength { expected: usize, found: usize },

    #[error("CSV error: {message}")]
    Csv { message: String },
}

impl From<csv::Error> for TableError {
    fn from(e: csv::Error) -> Self {
        Self::Csv {
            message: e.to_string(),
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `EnrichError`.
pub type Result<T> = std::result::Result<T, EnrichError>;
