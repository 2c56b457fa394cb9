//! Speech recognition engine abstraction.

pub mod command;
pub mod engine;

pub use command::CommandEngine;
pub use engine::{
    ComputeDevice, EngineConfig, MockEngine, RecognitionEngine, Transcription, call_with_timeout,
};
