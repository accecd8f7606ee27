//! Error taxonomy for loading, effect construction and frame output.

/// Result alias used throughout the crate.
pub type LightsResult<T> = Result<T, LightsError>;

#[derive(thiserror::Error, Debug)]
pub enum LightsError {
    /// Malformed or missing coordinate source. Fatal before any hardware write.
    #[error("input error: {0}")]
    Input(String),

    /// Degenerate point set for the requested effect. Fatal to that effect only.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Out-of-range effect or installation parameter.
    #[error("config error: {0}")]
    Config(String),

    /// A single tick's sink write or commit failed; the next tick retries.
    #[error("transient error: {0}")]
    Transient(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LightsError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Whether the render loop should log and carry on with the next tick.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
