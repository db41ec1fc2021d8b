/// Convenience result type used across Protean.
pub type ProteanResult<T> = Result<T, ProteanError>;

/// Top-level error taxonomy used by compiler APIs.
#[derive(thiserror::Error, Debug)]
pub enum ProteanError {
    /// Malformed archive or bytecode data: unknown discriminator,
    /// unsupported version, truncated stream. Fatal for the whole load.
    #[error("schema error: {0}")]
    Schema(String),

    /// Invalid user-provided graph data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Errors while linking an operation graph into a program.
    #[error("link error: {0}")]
    Link(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProteanError {
    /// Build a [`ProteanError::Schema`] value.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Build a [`ProteanError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ProteanError::Link`] value.
    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
