//! Speech recognition engine abstraction.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::defaults;
use crate::error::{Result, SottoError};

/// Text produced by one recognition call.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    /// The recognized text. May be empty for audio the engine heard
    /// nothing in.
    pub text: String,
    /// Engine-reported confidence, if available.
    pub confidence: Option<f32>,
    /// Detected language code, if the engine reports one.
    pub language: Option<String>,
}

impl Transcription {
    /// A plain text result with no metadata.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
            language: None,
        }
    }
}

/// Compute device a recognition engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Cuda,
}

impl ComputeDevice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeDevice::Cpu => "cpu",
            ComputeDevice::Cuda => "cuda",
        }
    }
}

/// Configuration for engine initialization.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model size or name, interpreted by the engine (e.g. Whisper family
    /// "tiny"/"small"/"medium").
    pub model_size: String,
    /// Device to run inference on.
    pub device: ComputeDevice,
    /// Maximum wall-clock time for one recognition call.
    pub timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_size: defaults::MODEL_SIZE.to_string(),
            device: ComputeDevice::Cpu,
            timeout: Duration::from_secs(defaults::RECOGNITION_TIMEOUT_SECS),
        }
    }
}

/// Trait for speech recognition engines.
///
/// Implementations must be callable from multiple worker threads at once;
/// an engine that serializes internally simply makes concurrent dispatch
/// degrade to serial throughput.
pub trait RecognitionEngine: Send + Sync {
    /// Recognizes text from 16-bit PCM mono samples at the given rate.
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<Transcription>;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;

    /// Whether the engine is loaded and able to take calls.
    fn is_ready(&self) -> bool;
}

impl<T: RecognitionEngine> RecognitionEngine for Arc<T> {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<Transcription> {
        (**self).transcribe(samples, sample_rate)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Runs one recognition call with a wall-clock deadline.
///
/// The call runs on a short-lived thread; if it exceeds `timeout` the call
/// is abandoned and any result it later produces is discarded when the
/// channel send fails. The engine reference must therefore be `'static`,
/// which `Arc<dyn RecognitionEngine>` satisfies.
pub fn call_with_timeout(
    engine: Arc<dyn RecognitionEngine>,
    samples: Vec<i16>,
    sample_rate: u32,
    utterance_seq: u64,
    timeout: Duration,
) -> Result<Transcription> {
    let (tx, rx) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name(format!("sotto-recognize-{}", utterance_seq))
        .spawn(move || {
            let outcome = engine.transcribe(&samples, sample_rate);
            // The receiver is gone if the call timed out; the late result
            // is simply dropped.
            let _ = tx.send(outcome);
        })
        .map_err(|e| SottoError::Other(format!("failed to spawn recognition thread: {}", e)))?;

    match rx.recv_timeout(timeout) {
        Ok(outcome) => outcome,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SottoError::RecognitionTimeout {
            utterance_seq,
            timeout_secs: timeout.as_secs(),
        }),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SottoError::RecognitionFailed {
            utterance_seq,
            message: "recognition thread exited without a result".to_string(),
        }),
    }
}

/// Mock engine for testing.
#[derive(Debug, Clone)]
pub struct MockEngine {
    model_name: String,
    response: String,
    should_fail: bool,
    delay: Option<Duration>,
}

impl MockEngine {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
            delay: None,
        }
    }

    /// Configure the mock to return a specific text.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on transcribe.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Configure the mock to sleep before answering, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl RecognitionEngine for MockEngine {
    fn transcribe(&self, _samples: &[i16], _sample_rate: u32) -> Result<Transcription> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        if self.should_fail {
            Err(SottoError::RecognitionFailed {
                utterance_seq: 0,
                message: "mock recognition failure".to_string(),
            })
        } else {
            Ok(Transcription::plain(self.response.clone()))
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.should_fail
    }
}
