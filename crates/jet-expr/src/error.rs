use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvalError {
    /// Operand types cannot be combined by the requested operation.
    #[error("invalid type for operation: {0}")]
    Type(String),
    /// Division by zero, conversion overflow, precision exceeded.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    /// A function was called with the wrong arity or a bad argument value.
    #[error("invalid function call: {0}")]
    Argument(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;
