//! Error types for the output stage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Render unit error: {0}")]
    RenderUnit(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, OutputError>;
