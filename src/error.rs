use thiserror::Error;

/// Main error type for the trading learner
#[derive(Error, Debug)]
pub enum TraderError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Shape errors
    #[error("Shape error in {context}: expected {expected}, received {actual}")]
    Shape {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Checkpoint shape mismatch: {0}")]
    CheckpointShapeMismatch(String),

    // Data access errors
    #[error("Index {index} out of bounds (valid range {min}..{max})")]
    IndexOutOfBounds { index: usize, min: usize, max: usize },

    #[error("Replay buffer is empty")]
    EmptyBuffer,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TraderError {
    /// Shorthand for a length mismatch at a call site
    pub fn shape(context: &'static str, expected: usize, actual: usize) -> Self {
        TraderError::Shape {
            context,
            expected,
            actual,
        }
    }
}

/// Result type alias for TraderError
pub type Result<T> = std::result::Result<T, TraderError>;
