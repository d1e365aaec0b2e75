use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroundError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Malformed action `{action}`: {reason}")]
    MalformedAction { action: String, reason: String },

    #[error("Grounding call failed: {0}")]
    GroundingCall(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Safety violation: {0}")]
    SafetyViolation(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl GroundError {
    pub fn malformed(action: impl Into<String>, reason: impl Into<String>) -> Self {
        GroundError::MalformedAction {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

pub type GroundResult<T> = Result<T, GroundError>;
