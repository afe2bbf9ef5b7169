use thiserror::Error;

/// Main error type for the Crucible dispatch substrate
#[derive(Error, Debug, Clone)]
pub enum CrucibleError {
    /// Pop beyond stack depth - programmer error in scope nesting
    #[error("Empty mode stack: {0}")]
    EmptyStackError(String),

    /// An output lacks the interception capability required for a storage
    /// swap, or the alias metadata itself is malformed
    #[error("Alias schema violation in '{op}': {message}")]
    AliasSchemaError { op: String, message: String },

    /// Operator declares some-but-not-all write-marked returns
    #[error("Mixed read/write return schema in '{0}' is unsupported")]
    MixedAliasSchemaError(String),

    /// A value was expected to implement the wrapper protocol
    #[error("Not a wrapper subclass: {0}")]
    NotWrapperSubclassError(String),

    /// Operator identifier has no registered schema
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// Shape-related errors
    #[error("Shape error: {0}")]
    ShapeError(String),

    /// Operation errors with context
    #[error("Operation error: {operation} - {message}")]
    OperationError { operation: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal errors that shouldn't happen
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl CrucibleError {
    /// Create an empty-stack error naming the stack that was popped
    pub fn empty_stack(stack: &str) -> Self {
        CrucibleError::EmptyStackError(stack.to_string())
    }

    /// Create an alias schema error pinned to an output slot
    pub fn alias_schema(op: &str, slot: usize, message: &str) -> Self {
        CrucibleError::AliasSchemaError {
            op: op.to_string(),
            message: format!("output slot {}: {}", slot, message),
        }
    }

    /// Create an operation error with context
    pub fn operation_error(operation: &str, message: &str) -> Self {
        CrucibleError::OperationError {
            operation: operation.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<std::io::Error> for CrucibleError {
    fn from(err: std::io::Error) -> Self {
        CrucibleError::ConfigurationError(err.to_string())
    }
}

impl From<serde_json::Error> for CrucibleError {
    fn from(err: serde_json::Error) -> Self {
        CrucibleError::ConfigurationError(err.to_string())
    }
}

/// Result type for Crucible operations
pub type CrucibleResult<T> = Result<T, CrucibleError>;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    EmptyStack,
    AliasSchema,
    MixedAliasSchema,
    NotWrapperSubclass,
    UnknownOperator,
    ShapeMismatch,
    InvalidOperation,
    ConfigInvalid,
    InternalError,
}

impl CrucibleError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            CrucibleError::EmptyStackError(_) => ErrorCode::EmptyStack,
            CrucibleError::AliasSchemaError { .. } => ErrorCode::AliasSchema,
            CrucibleError::MixedAliasSchemaError(_) => ErrorCode::MixedAliasSchema,
            CrucibleError::NotWrapperSubclassError(_) => ErrorCode::NotWrapperSubclass,
            CrucibleError::UnknownOperator(_) => ErrorCode::UnknownOperator,
            CrucibleError::ShapeError(_) => ErrorCode::ShapeMismatch,
            CrucibleError::OperationError { .. } => ErrorCode::InvalidOperation,
            CrucibleError::ConfigurationError(_) => ErrorCode::ConfigInvalid,
            CrucibleError::InternalError(_) => ErrorCode::InternalError,
        }
    }

    /// Local-invariant violations abort the enclosing operator call and are
    /// never retried
    pub fn is_recoverable(&self) -> bool {
        matches!(self.code(), ErrorCode::ConfigInvalid | ErrorCode::UnknownOperator)
    }
}
