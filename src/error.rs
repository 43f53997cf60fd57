//! Error types for schema shipping and predicate evaluation

use std::sync::Arc;

use thiserror::Error;

/// Result type for filter operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// Filter errors
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Schema not found for message type {name}")]
    SchemaNotFound { name: String },

    #[error("No schema payload supplied for {name} and no cached schema under its key")]
    MissingPayload { name: String },

    #[error("Unit {unit} depends on {dependency}, which was not supplied")]
    UndeclaredDependency { unit: String, dependency: String },

    #[error("Unresolved type reference {type_name} in {scope}")]
    UnresolvedType { type_name: String, scope: String },

    #[error("Dependency cycle through unit {0}")]
    DependencyCycle(String),

    #[error("Unsupported field type {kind} for field {field}")]
    UnsupportedFieldType { field: String, kind: String },

    #[error("Invalid default value {value:?} for field {field}")]
    InvalidDefault { field: String, value: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unsupported payload format version {0}")]
    UnsupportedVersion(u8),

    #[error("Truncated input: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Malformed message {message}: {reason}")]
    MalformedMessage { message: String, reason: String },

    #[error("Field path {path} ends on message-typed field {field}")]
    PathEndsOnMessage { path: String, field: String },

    #[error("Field {field} is repeated and cannot be compared as a scalar")]
    RepeatedField { field: String },

    #[error("Cannot compare {operand} operand with {scalar} field value")]
    TypeMismatch {
        operand: &'static str,
        scalar: &'static str,
    },

    #[error("Unknown match op key {0}")]
    UnknownMatchOp(u8),

    #[error("Unknown compare op ordinal {0}")]
    UnknownCompareOp(u8),

    #[error("Unknown group operator tag {0}")]
    UnknownOperator(u8),

    #[error("Unknown filter kind tag {0}")]
    UnknownFilterKind(u8),

    #[error("Unknown byte comparator kind {0}")]
    UnknownComparator(String),

    #[error("Invalid operand: {0}")]
    InvalidOperand(String),

    #[error("Scalar match op used for whole-message matching")]
    ScalarMessageMatch,

    #[error("Protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Shared(#[from] Arc<FilterError>),
}

impl FilterError {
    /// The underlying error, looking through errors shared out of a cache load
    pub fn root_cause(&self) -> &FilterError {
        match self {
            FilterError::Shared(inner) => inner.root_cause(),
            other => other,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        FilterError::MalformedPayload(reason.into())
    }
}
