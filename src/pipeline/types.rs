//! Data types flowing through the capture and dispatch pipeline.

use std::time::{Duration, Instant};

/// A frame of raw audio samples with timing information.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// PCM samples (16-bit signed integers).
    pub samples: Vec<i16>,
    /// Timestamp when this frame was captured.
    pub timestamp: Instant,
    /// Sequence number for ordering and gap detection.
    pub sequence: u64,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(samples: Vec<i16>, timestamp: Instant, sequence: u64) -> Self {
        Self {
            samples,
            timestamp,
            sequence,
        }
    }
}

/// An audio frame labeled by the energy detector.
#[derive(Debug, Clone)]
pub struct LabeledFrame {
    /// The underlying frame.
    pub frame: AudioFrame,
    /// Whether the detector classified this frame as speech.
    pub is_speech: bool,
    /// Normalized RMS level of the frame (0.0 = silence, 1.0 = full scale).
    pub level: f32,
}

impl LabeledFrame {
    /// Creates a new labeled frame.
    pub fn new(frame: AudioFrame, is_speech: bool, level: f32) -> Self {
        Self {
            frame,
            is_speech,
            level,
        }
    }
}

/// A complete utterance ready for recognition.
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Concatenated PCM samples, including lead and trail padding.
    pub samples: Vec<i16>,
    /// Monotonic utterance sequence number, assigned at finalization.
    pub seq: u64,
    /// Sequence number of the first frame included (padding counts).
    pub first_frame: u64,
    /// Sequence number of the last frame included.
    pub last_frame: u64,
    /// Capture timestamp of the first included frame.
    pub started_at: Instant,
    /// Capture timestamp of the last included frame.
    pub ended_at: Instant,
    /// Number of frames the detector labeled as speech.
    pub speech_frames: u32,
}

impl Utterance {
    /// Duration of the utterance audio for a given sample rate.
    pub fn duration(&self, sample_rate: u32) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / sample_rate as f64)
    }
}

/// Result of recognizing one utterance.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    /// Sequence number of the utterance this text came from.
    pub utterance_seq: u64,
    /// The recognized text.
    pub text: String,
    /// Engine-reported confidence, if available.
    pub confidence: Option<f32>,
    /// Detected language code, if the engine reports one.
    pub language: Option<String>,
}

/// Observable pipeline events, delivered on a non-blocking channel.
///
/// Event delivery is best effort: if the subscriber falls behind, events
/// are dropped rather than stalling the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The detector confirmed speech onset; an utterance is accumulating.
    SpeechStarted { frame_sequence: u64 },
    /// An utterance was finalized and handed to the dispatch queue.
    UtteranceFinalized { seq: u64, duration_ms: u32 },
    /// An accumulating segment was discarded for being below the minimum
    /// utterance duration.
    UtteranceDiscarded { duration_ms: u32 },
    /// The dispatch queue was full; the oldest queued utterance was dropped.
    Backpressure { dropped_seq: u64 },
    /// Recognition finished for an utterance (empty text still counts).
    Recognized { seq: u64, chars: usize },
    /// Recognition failed or timed out for an utterance.
    RecognitionFailed { seq: u64 },
    /// The capture path observed a source error.
    SourceError { message: String },
    /// The pipeline stopped (requested or due to source exhaustion/failure).
    Stopped,
}
