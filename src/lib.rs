//! sotto - Push-to-talk dictation pipeline for Linux
//!
//! Captures microphone audio, segments it into utterances by signal
//! energy, and dispatches each utterance to a speech recognition engine.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod pipeline;
pub mod segment;
pub mod stt;

// Core traits (source → recognize → sink)
pub use audio::calibrate::{CalibrationCache, Calibrator};
pub use audio::energy::{FrameFilter, NoFilter};
pub use audio::source::AudioSource;
pub use pipeline::sink::{CollectorSink, StdoutSink, TextSink};
pub use stt::engine::RecognitionEngine;

// Pipeline
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use pipeline::types::{PipelineEvent, TranscriptionResult, Utterance};

// Segmentation
pub use segment::{SegmentOutput, Segmenter, SegmenterConfig};

// Error handling
pub use error::{Result, SottoError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"`
/// otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
