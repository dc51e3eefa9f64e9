use std::panic::Location;

use thiserror::Error;

/// SQLSTATE reported by PostgreSQL for a unique constraint violation.
pub const UNIQUE_VIOLATION: &str = "23505";

/// Error type for pgfmt operations
#[derive(Debug, Error)]
pub enum PgFmtError {
    #[error("Template compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A new query was started while the result of a previous one on the same
    /// connection was still open. This is a bug in the caller.
    #[error("Query still open: {open}; new query: {template}")]
    ProtocolViolation { open: String, template: String },

    #[error("Query({sql}) failed: {} :: {message}", code.as_deref().unwrap_or("<no SQLSTATE>"))]
    QueryFailed {
        sql: String,
        code: Option<String>,
        message: String,
    },

    #[error("Query({sql}) violates a unique constraint: {message}")]
    DuplicateKey { sql: String, message: String },

    #[error("{column} is not {expected}: {reason}")]
    Decode {
        column: String,
        expected: &'static str,
        reason: String,
    },

    #[error("{field} field missing, check the SQL ({caller})")]
    FieldMissing {
        field: String,
        caller: &'static Location<'static>,
    },

    /// The driver produced no reply at all. Only surfaces from driver
    /// implementations; the executor turns it into a retry or `QueryFailed`.
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PgFmtError {
    /// True for a unique constraint violation, which callers usually treat as
    /// an expected outcome rather than a failure.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, PgFmtError::DuplicateKey { .. })
    }

    /// True for failures that the executor handles by reconnecting and
    /// resending.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PgFmtError::Transport(_))
    }

    /// The compiled SQL attached to a query failure, if any.
    pub fn sql(&self) -> Option<&str> {
        match self {
            PgFmtError::QueryFailed { sql, .. } | PgFmtError::DuplicateKey { sql, .. } => {
                Some(sql)
            }
            _ => None,
        }
    }
}

/// Errors raised while turning a template and its arguments into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Unknown directive %{directive} at byte {position}")]
    UnknownDirective { directive: char, position: usize },

    #[error("Directive at the end of the template")]
    TruncatedDirective,

    #[error("Too many bound parameters (max {max})")]
    TooManyParams { max: usize },

    #[error("Query does not fit in {capacity} bytes")]
    QueryTooLong { capacity: usize },

    #[error("No argument for %{directive} at byte {position}")]
    MissingArgument { directive: char, position: usize },

    #[error("%{directive} at byte {position} expects {expected}, got {actual}")]
    ArgumentMismatch {
        directive: char,
        position: usize,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{count} argument(s) not consumed by the template")]
    UnusedArguments { count: usize },

    #[error("Template produces an empty statement")]
    EmptyQuery,
}

/// Result type alias for pgfmt operations
pub type Result<T> = std::result::Result<T, PgFmtError>;
