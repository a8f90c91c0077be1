/// Result alias used across the crate.
pub type PlayheadResult<T> = Result<T, PlayheadError>;

/// Error type shared by every layer of the playback core.
#[derive(thiserror::Error, Debug)]
pub enum PlayheadError {
    /// Invalid argument, range, or configuration value.
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed graph edit (unknown node, bad slot, cycle).
    #[error("graph error: {0}")]
    Graph(String),

    /// Frame cache storage or index failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// Reader or decode worker failure.
    #[error("decode error: {0}")]
    Decode(String),

    /// Settings or index (de)serialization failure.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Underlying filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Anything else, with context attached by the caller.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PlayheadError {
    /// Build a [`PlayheadError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`PlayheadError::Graph`] value.
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Build a [`PlayheadError::Cache`] value.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Build a [`PlayheadError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`PlayheadError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
