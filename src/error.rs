use thiserror::Error;

/// Main error type for model construction and execution
#[derive(Error, Debug)]
pub enum FuncNetError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    // Shape errors
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Invalid units for layer '{layer}': {units}")]
    InvalidUnits { layer: String, units: usize },

    #[error("Incompatible input for layer '{layer}': {reason}")]
    IncompatibleShape { layer: String, reason: String },

    // Layer option errors
    #[error("Unknown activation: '{0}'")]
    UnknownActivation(String),

    #[error("Unknown dtype: '{0}'")]
    UnknownDType(String),

    // Graph assembly errors
    #[error("Model must declare at least one input and one output")]
    EmptyModel,

    #[error("Disconnected graph: {0}")]
    DisconnectedGraph(String),

    #[error("Duplicate layer name: {0}")]
    DuplicateName(String),

    // Runtime errors
    #[error("Unsupported model for execution: {0}")]
    Unsupported(String),

    #[error("Input mismatch: expected per-sample dims {expected:?}, found {found:?}")]
    InputMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for FuncNetError
pub type Result<T> = std::result::Result<T, FuncNetError>;

impl FuncNetError {
    pub(crate) fn incompatible(layer: &str, reason: impl Into<String>) -> Self {
        Self::IncompatibleShape {
            layer: layer.to_string(),
            reason: reason.into(),
        }
    }
}
