// Error types for the canvas node and the matting service

use thiserror::Error;

/// Failures on the canvas side: ingest, canvas files, data URLs.
///
/// These are mostly recoverable. The node substitutes defaults instead of
/// failing the pipeline run.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("unexpected tensor shape {shape:?}: {reason}")]
    Shape { shape: Vec<usize>, reason: String },

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("canvas file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid canvas file name: {0}")]
    InvalidPath(String),
}

impl CanvasError {
    pub fn shape(shape: &[usize], reason: impl Into<String>) -> Self {
        CanvasError::Shape {
            shape: shape.to_vec(),
            reason: reason.into(),
        }
    }
}

/// Problems with the server configuration file or its environment overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    Env { var: String, value: String },
}

/// Failures on the matting path. None of these are downgraded to defaults
/// except `DegenerateRange`, which the pipeline maps to an all-zero mask.
#[derive(Debug, Error)]
pub enum MattingError {
    #[error("unexpected tensor shape {shape:?}: {reason}")]
    Shape { shape: Vec<usize>, reason: String },

    #[error("failed to load model '{key}': {reason}")]
    ModelLoad { key: String, reason: String },

    #[error("model '{key}' is unavailable")]
    ModelUnavailable {
        key: String,
        #[source]
        source: Box<MattingError>,
    },

    #[error("failed to decode image payload: {0}")]
    Decode(String),

    #[error("degenerate value range: min == max == {value}")]
    DegenerateRange { value: f32 },

    #[error("invalid matting request: {0}")]
    InvalidRequest(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("failed to encode result: {0}")]
    Encode(String),
}

impl MattingError {
    pub fn shape(shape: &[usize], reason: impl Into<String>) -> Self {
        MattingError::Shape {
            shape: shape.to_vec(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly name, used in status events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MattingError::Shape { .. } => "ShapeError",
            MattingError::ModelLoad { .. } => "ModelLoadError",
            MattingError::ModelUnavailable { .. } => "ModelUnavailable",
            MattingError::Decode(_) => "DecodeError",
            MattingError::DegenerateRange { .. } => "DegenerateRangeError",
            MattingError::InvalidRequest(_) => "InvalidRequest",
            MattingError::Inference(_) => "InferenceError",
            MattingError::Encode(_) => "EncodeError",
        }
    }
}

impl From<CanvasError> for MattingError {
    fn from(err: CanvasError) -> Self {
        match err {
            CanvasError::Shape { shape, reason } => MattingError::Shape { shape, reason },
            CanvasError::Decode(msg) => MattingError::Decode(msg),
            other => MattingError::Encode(other.to_string()),
        }
    }
}
