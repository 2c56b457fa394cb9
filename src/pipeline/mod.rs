//! Capture-to-text pipeline.
//!
//! A capture thread frames and segments the audio stream; finalized
//! utterances cross a bounded queue to recognition workers whose results
//! reach the sink in utterance order.

pub mod orchestrator;
pub mod sink;
pub mod types;

pub use orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use sink::{CollectorSink, StdoutSink, TextSink};
pub use types::{AudioFrame, LabeledFrame, PipelineEvent, TranscriptionResult, Utterance};
