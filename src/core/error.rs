//! Error types for the hairpeel renderer

use thiserror::Error;

/// Main error type for the renderer
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Asset error: {0}")]
    Asset(String),

    #[error("Shader error in '{name}': {message}")]
    Shader { name: String, message: String },

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
