//! Error types for sotto.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SottoError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("Audio stream interrupted: {message}")]
    StreamInterrupted { message: String },

    // Recognition errors
    #[error("Recognition failed for utterance {utterance_seq}: {message}")]
    RecognitionFailed { utterance_seq: u64, message: String },

    #[error("Recognition timed out for utterance {utterance_seq} after {timeout_secs}s")]
    RecognitionTimeout { utterance_seq: u64, timeout_secs: u64 },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SottoError>;
