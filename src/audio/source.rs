//! Audio input abstraction.

use std::collections::VecDeque;

use crate::defaults;
use crate::error::{Result, SottoError};

/// Trait for audio sources.
///
/// Sources are pull-based: the capture thread polls `read_samples` and
/// receives whatever accumulated since the last call. This keeps device
/// callbacks out of the pipeline and makes file playback and mocks
/// trivially swappable for a live microphone.
pub trait AudioSource: Send {
    /// Start capturing audio from the source.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing audio from the source.
    fn stop(&mut self) -> Result<()>;

    /// Read whatever 16-bit PCM mono samples are available.
    ///
    /// An empty vector means no samples right now; for a finite source it
    /// means the source is exhausted.
    fn read_samples(&mut self) -> Result<Vec<i16>>;

    /// Whether the source ends on its own (files, scripted mocks) rather
    /// than running until stopped (microphones).
    fn is_finite(&self) -> bool {
        false
    }
}

/// Configuration for audio source initialization.
#[derive(Debug, Clone)]
pub struct AudioSourceConfig {
    pub sample_rate: u32,
    /// Preferred device name, or `None` for the system default.
    pub device: Option<String>,
}

impl Default for AudioSourceConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            device: None,
        }
    }
}

#[derive(Debug, Clone)]
enum ScriptStep {
    Chunk(Vec<i16>),
    Fail(String),
}

/// Mock audio source for testing.
///
/// Plays back a script of sample chunks and injected failures, one step
/// per `read_samples` call, then reports exhaustion with empty reads.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    is_started: bool,
    script: VecDeque<ScriptStep>,
    frame_samples: usize,
    should_fail_start: bool,
    should_fail_stop: bool,
}

impl MockAudioSource {
    pub fn new() -> Self {
        Self {
            is_started: false,
            script: VecDeque::new(),
            frame_samples: 320,
            should_fail_start: false,
            should_fail_stop: false,
        }
    }

    /// Sets the chunk size used by `with_silence` and `with_speech`.
    pub fn with_frame_samples(mut self, frame_samples: usize) -> Self {
        self.frame_samples = frame_samples;
        self
    }

    /// Appends `frames` chunks of zero samples.
    pub fn with_silence(mut self, frames: usize) -> Self {
        for _ in 0..frames {
            self.script
                .push_back(ScriptStep::Chunk(vec![0i16; self.frame_samples]));
        }
        self
    }

    /// Appends `frames` chunks of constant-amplitude samples.
    pub fn with_speech(mut self, frames: usize, amplitude: i16) -> Self {
        for _ in 0..frames {
            self.script
                .push_back(ScriptStep::Chunk(vec![amplitude; self.frame_samples]));
        }
        self
    }

    /// Appends one chunk of arbitrary samples.
    pub fn with_chunk(mut self, samples: Vec<i16>) -> Self {
        self.script.push_back(ScriptStep::Chunk(samples));
        self
    }

    /// Appends a read error at this point in the script.
    pub fn with_read_failure(mut self, message: &str) -> Self {
        self.script
            .push_back(ScriptStep::Fail(message.to_string()));
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Configure the mock to fail on stop.
    pub fn with_stop_failure(mut self) -> Self {
        self.should_fail_stop = true;
        self
    }

    pub fn is_started(&self) -> bool {
        self.is_started
    }

    /// Steps remaining in the script.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.should_fail_start {
            Err(SottoError::DeviceUnavailable {
                device: "mock".to_string(),
            })
        } else {
            self.is_started = true;
            Ok(())
        }
    }

    fn stop(&mut self) -> Result<()> {
        if self.should_fail_stop {
            Err(SottoError::StreamInterrupted {
                message: "mock stop failure".to_string(),
            })
        } else {
            self.is_started = false;
            Ok(())
        }
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        match self.script.pop_front() {
            Some(ScriptStep::Chunk(samples)) => Ok(samples),
            Some(ScriptStep::Fail(message)) => Err(SottoError::StreamInterrupted { message }),
            None => Ok(Vec::new()),
        }
    }

    fn is_finite(&self) -> bool {
        true
    }
}
