/// Result alias that carries the custom [`AlgoVizError`] type.
pub type Result<T> = std::result::Result<T, AlgoVizError>;

/// Common error type for the core crate.
///
/// Engines validate their input before touching any state, so a returned error
/// always means the structure and its recorder are exactly as they were before
/// the call.
#[derive(Debug, thiserror::Error)]
pub enum AlgoVizError {
    /// The operation needs at least one element and the structure is empty.
    #[error("operation requires a non-empty {0}")]
    EmptyStructure(&'static str),
    /// A key, point or configuration value was malformed or out of range.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The selected engine does not provide the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl AlgoVizError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid<T: Into<String>>(reason: T) -> Self {
        Self::InvalidInput(reason.into())
    }
}

impl From<&str> for AlgoVizError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for AlgoVizError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
