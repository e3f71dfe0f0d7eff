use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalcError {
    /// Value cannot be represented within the column's declared limits
    /// (precision exceeded, mantissa too wide for the field).
    #[error("numeric value out of range: {0}")]
    Arithmetic(String),
    /// Stored bytes are too short or internally inconsistent.
    #[error("malformed calculated value: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, CalcError>;
