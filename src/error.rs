use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubrelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Subtitle parse error: {0}")]
    Parse(String),

    #[error("Translation engine not available: {0}")]
    EngineUnavailable(String),

    #[error("Translation engine failed: {0}")]
    EngineFailure(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, SubrelayError>;
