use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("page I/O failure: {0}")]
    Io(#[from] std::io::Error),
    /// An on-disk invariant was violated (unknown map type, wrong page-type
    /// marker, double add/remove). Not recoverable.
    #[error("corrupt page data: {0}")]
    Corrupt(String),
    #[error("page {page} is out of supported range")]
    OutOfRange { page: u32 },
}

pub type Result<T> = std::result::Result<T, PageError>;
