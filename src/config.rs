use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::calibrate::CalibratorConfig;
use crate::audio::energy::DetectorConfig;
use crate::audio::source::AudioSourceConfig;
use crate::defaults;
use crate::dispatch::dispatcher::{DispatchPolicy, DispatcherConfig};
use crate::error::{Result, SottoError};
use crate::pipeline::orchestrator::PipelineConfig;
use crate::segment::SegmenterConfig;
use crate::stt::engine::{ComputeDevice, EngineConfig};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioSection,
    pub detector: DetectorSection,
    pub segment: SegmentSection,
    pub dispatch: DispatchSection,
    pub engine: EngineSection,
    pub hotkeys: HotkeySection,
    /// Dump finalized utterances as WAV files for troubleshooting.
    pub debug_audio: bool,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSection {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub frame_ms: u32,
}

/// Speech detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorSection {
    pub threshold: f32,
    pub hysteresis_frames: u32,
    /// Measure ambient noise at session start and override `threshold`
    /// with an adaptive value (cached per device for 24h).
    pub auto_calibrate: bool,
}

/// Utterance segmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SegmentSection {
    pub pre_roll_ms: u32,
    pub trail_pad_ms: u32,
    pub finalize_silence_ms: u32,
    pub min_utterance_ms: u32,
    pub max_utterance_ms: u32,
}

/// Recognition dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchSection {
    /// Number of recognition workers. 1 means serial dispatch.
    pub workers: usize,
    pub queue_capacity: usize,
    pub timeout_secs: u64,
}

/// Recognition engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    pub model: String,
    /// "cpu" or "cuda".
    pub device: String,
    /// External recognizer command; receives a WAV path as last argument.
    pub command: Option<String>,
}

/// Hotkey bindings, stored for the desktop shell that registers them.
/// This crate never grabs keys itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HotkeySection {
    pub toggle_dictation: String,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
        }
    }
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self {
            threshold: defaults::SILENCE_THRESHOLD,
            hysteresis_frames: defaults::HYSTERESIS_FRAMES,
            auto_calibrate: true,
        }
    }
}

impl Default for SegmentSection {
    fn default() -> Self {
        Self {
            pre_roll_ms: defaults::PRE_ROLL_MS,
            trail_pad_ms: defaults::TRAIL_PAD_MS,
            finalize_silence_ms: defaults::MAX_SILENCE_MS,
            min_utterance_ms: defaults::MIN_UTTERANCE_MS,
            max_utterance_ms: defaults::MAX_UTTERANCE_MS,
        }
    }
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: defaults::QUEUE_CAPACITY,
            timeout_secs: defaults::RECOGNITION_TIMEOUT_SECS,
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            model: defaults::MODEL_SIZE.to_string(),
            device: "cpu".to_string(),
            command: None,
        }
    }
}

impl Default for HotkeySection {
    fn default() -> Self {
        Self {
            toggle_dictation: "ctrl+alt+d".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML or fails
    /// validation. Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't
    /// exist
    ///
    /// Only returns defaults if the file is missing. Invalid TOML and
    /// validation failures are still errors.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(SottoError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SOTTO_MODEL → engine.model
    /// - SOTTO_AUDIO_DEVICE → audio.device
    /// - SOTTO_THRESHOLD → detector.threshold
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("SOTTO_MODEL")
            && !model.is_empty()
        {
            self.engine.model = model;
        }

        if let Ok(device) = std::env::var("SOTTO_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(threshold) = std::env::var("SOTTO_THRESHOLD")
            && let Ok(value) = threshold.parse::<f32>()
        {
            self.detector.threshold = value;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/sotto/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("sotto")
            .join("config.toml")
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        fn invalid(key: &str, message: impl Into<String>) -> SottoError {
            SottoError::InvalidValue {
                key: key.to_string(),
                message: message.into(),
            }
        }

        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be greater than zero"));
        }
        if self.audio.frame_ms == 0 {
            return Err(invalid("audio.frame_ms", "must be greater than zero"));
        }
        if !(self.detector.threshold > 0.0 && self.detector.threshold < 1.0) {
            return Err(invalid(
                "detector.threshold",
                "must be between 0.0 and 1.0 exclusive",
            ));
        }
        if self.detector.hysteresis_frames == 0 {
            return Err(invalid(
                "detector.hysteresis_frames",
                "must be greater than zero",
            ));
        }
        if self.segment.max_utterance_ms <= self.segment.min_utterance_ms {
            return Err(invalid(
                "segment.max_utterance_ms",
                format!(
                    "must exceed min_utterance_ms ({})",
                    self.segment.min_utterance_ms
                ),
            ));
        }
        if self.segment.finalize_silence_ms < self.segment.trail_pad_ms {
            return Err(invalid(
                "segment.finalize_silence_ms",
                format!(
                    "must be at least trail_pad_ms ({})",
                    self.segment.trail_pad_ms
                ),
            ));
        }
        // Durations are converted to whole frame counts; a value that
        // truncates to zero frames would finalize on every frame.
        let frame_ms = self.audio.frame_ms;
        if self.segment.finalize_silence_ms < frame_ms {
            return Err(invalid(
                "segment.finalize_silence_ms",
                format!("must cover at least one {frame_ms}ms frame"),
            ));
        }
        if self.segment.max_utterance_ms < frame_ms {
            return Err(invalid(
                "segment.max_utterance_ms",
                format!("must cover at least one {frame_ms}ms frame"),
            ));
        }
        for (key, value) in [
            ("segment.pre_roll_ms", self.segment.pre_roll_ms),
            ("segment.trail_pad_ms", self.segment.trail_pad_ms),
            ("segment.min_utterance_ms", self.segment.min_utterance_ms),
        ] {
            if value > 0 && value < frame_ms {
                return Err(invalid(
                    key,
                    format!("must be 0 or cover at least one {frame_ms}ms frame"),
                ));
            }
        }
        if self.dispatch.workers == 0 {
            return Err(invalid("dispatch.workers", "must be at least 1"));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(invalid("dispatch.queue_capacity", "must be at least 1"));
        }
        if self.dispatch.timeout_secs == 0 {
            return Err(invalid("dispatch.timeout_secs", "must be at least 1"));
        }
        if self.engine.device != "cpu" && self.engine.device != "cuda" {
            return Err(invalid(
                "engine.device",
                format!("unknown device \"{}\"", self.engine.device),
            ));
        }
        Ok(())
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            threshold: self.detector.threshold,
            hysteresis_frames: self.detector.hysteresis_frames,
        }
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        let frame_ms = self.audio.frame_ms;
        SegmenterConfig {
            frame_ms,
            pre_roll_frames: self.segment.pre_roll_ms / frame_ms,
            trail_pad_frames: self.segment.trail_pad_ms / frame_ms,
            finalize_silence_frames: self.segment.finalize_silence_ms / frame_ms,
            min_utterance_frames: self.segment.min_utterance_ms / frame_ms,
            max_utterance_frames: self.segment.max_utterance_ms / frame_ms,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let policy = if self.dispatch.workers <= 1 {
            DispatchPolicy::Serial
        } else {
            DispatchPolicy::Concurrent {
                workers: self.dispatch.workers,
            }
        };
        DispatcherConfig {
            policy,
            queue_capacity: self.dispatch.queue_capacity,
            timeout: Duration::from_secs(self.dispatch.timeout_secs),
            sample_rate: self.audio.sample_rate,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        let device = if self.engine.device == "cuda" {
            ComputeDevice::Cuda
        } else {
            ComputeDevice::Cpu
        };
        EngineConfig {
            model_size: self.engine.model.clone(),
            device,
            timeout: Duration::from_secs(self.dispatch.timeout_secs),
        }
    }

    pub fn calibrator_config(&self) -> CalibratorConfig {
        CalibratorConfig {
            sample_rate: self.audio.sample_rate,
            frame_ms: self.audio.frame_ms,
            ..CalibratorConfig::default()
        }
    }

    pub fn source_config(&self) -> AudioSourceConfig {
        AudioSourceConfig {
            sample_rate: self.audio.sample_rate,
            device: self.audio.device.clone(),
        }
    }

    /// Assemble the pipeline configuration from the loaded sections.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            detector: self.detector_config(),
            segmenter: self.segmenter_config(),
            dispatcher: self.dispatcher_config(),
            sample_rate: self.audio.sample_rate,
            frame_ms: self.audio.frame_ms,
            debug_dump: self.debug_audio,
            ..PipelineConfig::default()
        }
    }
}
