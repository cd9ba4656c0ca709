use std::fmt;

// Error
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug)]
pub enum RuntimeError {
    /// The engine rejected or failed a specific operation.
    Engine(String),
    /// The engine itself is not reachable.
    Unavailable(String),
    /// A store operation failed.
    Store(String),
    /// Outbound request plumbing failed (not an individual load-test request).
    Request(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Engine(e) => write!(f, "{e}"),
            RuntimeError::Unavailable(e) => write!(f, "Engine Unavailable: {e}"),
            RuntimeError::Store(e) => write!(f, "Store Error: {e}"),
            RuntimeError::Request(e) => write!(f, "Request Error: {e}"),
        }
    }
}

impl From<sea_orm::DbErr> for RuntimeError {
    fn from(err: sea_orm::DbErr) -> Self {
        RuntimeError::Store(err.to_string())
    }
}
