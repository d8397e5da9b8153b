use thiserror::Error;

use crate::datatype::{Operation, Type};

#[derive(Error, Debug, Clone)]
pub enum AtlasError {
    #[error("Incompatible types: {left} and {right} in operation {operation}")]
    IncompatibleTypes { left: Type, right: Type, operation: Operation },
    #[error("Type {ty} does not provide operation {operation}")]
    UnsupportedOperation { ty: Type, operation: Operation },
    #[error("Type {from} cannot be converted to {to}")]
    UnsupportedConversion { from: Type, to: Type },
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
    #[error("Invalid type: expected {expected}, got {actual}")]
    InvalidType { expected: String, actual: String },
    #[error("No such attribute: {0}")]
    NoSuchAttribute(String),
    #[error("No such zone: {0}")]
    NoSuchZone(String),
    #[error("Alias collision: {0}")]
    AliasCollision(String),
    #[error("All items in top-level SELECT must be aliased: {0}")]
    UnaliasedItem(String),
    #[error("Error evaluating `{context}`: {source}")]
    InsideQuery { context: String, source: Box<AtlasError> },
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Config error: {0}")]
    Config(String),
    #[error("Execution error: {0}")]
    Execution(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, AtlasError>;

impl AtlasError {
    pub fn incompatible(left: Type, right: Type, operation: Operation) -> Self {
        Self::IncompatibleTypes { left, right, operation }
    }
    pub fn unsupported(ty: Type, operation: Operation) -> Self {
        Self::UnsupportedOperation { ty, operation }
    }
    pub fn conversion(from: Type, to: Type) -> Self {
        Self::UnsupportedConversion { from, to }
    }
    pub fn division_by_zero() -> Self {
        Self::Arithmetic("Division by zero.".into())
    }
    pub fn overflow(operation: Operation) -> Self {
        Self::Arithmetic(format!("integer overflow in {operation}"))
    }
    /// Wraps an error with the source text of the construct that was being
    /// evaluated when it occurred.
    pub fn inside(context: impl Into<String>, source: AtlasError) -> Self {
        Self::InsideQuery { context: context.into(), source: Box::new(source) }
    }
    /// The innermost error of a chain built by [`AtlasError::inside`].
    pub fn root_cause(&self) -> &AtlasError {
        let mut current = self;
        while let Self::InsideQuery { source, .. } = current {
            current = source;
        }
        current
    }
    /// Source texts of the enclosing constructs, outermost first.
    pub fn breadcrumbs(&self) -> Vec<&str> {
        let mut trail = Vec::new();
        let mut current = self;
        while let Self::InsideQuery { context, source } = current {
            trail.push(context.as_str());
            current = source;
        }
        trail
    }
}

// Helper conversions
impl From<::config::ConfigError> for AtlasError {
    fn from(e: ::config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl<T> From<std::sync::PoisonError<T>> for AtlasError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
