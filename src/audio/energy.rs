//! Energy-based speech detection.
//!
//! Classifies fixed-size audio frames as speech or silence using RMS
//! thresholding with hysteresis, so a transient spike or dropout does not
//! flip the detector state.

use crate::defaults;

/// Configuration for the energy detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectorConfig {
    /// RMS threshold separating speech from silence (0.0 to 1.0).
    pub threshold: f32,
    /// Consecutive frames required to confirm a state transition.
    pub hysteresis_frames: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::SILENCE_THRESHOLD,
            hysteresis_frames: defaults::HYSTERESIS_FRAMES,
        }
    }
}

/// In-place transform applied to each frame before detection.
///
/// Filters run on the capture thread and see every frame exactly once,
/// in order, so a stateful implementation (noise gate, high-pass) works.
/// The transform must preserve frame length.
pub trait FrameFilter: Send {
    fn apply(&mut self, frame: &mut [i16]);

    fn name(&self) -> &str {
        "filter"
    }
}

/// Pass-through filter, the default.
#[derive(Debug, Default)]
pub struct NoFilter;

impl FrameFilter for NoFilter {
    fn apply(&mut self, _frame: &mut [i16]) {}

    fn name(&self) -> &str {
        "none"
    }
}

/// Per-frame classification result.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    /// Confirmed speech state after hysteresis.
    pub is_speech: bool,
    /// Raw normalized RMS of the frame.
    pub level: f32,
}

/// RMS detector with hysteresis.
///
/// The detector holds a confirmed state (speech or silence) and only flips
/// it after `hysteresis_frames` consecutive frames cross the threshold in
/// the opposite direction. A frame's label is the confirmed state after
/// that frame is applied, so the frames that caused a flip to speech are
/// themselves labeled as speech.
#[derive(Debug)]
pub struct EnergyDetector {
    config: DetectorConfig,
    in_speech: bool,
    contrary_run: u32,
}

impl EnergyDetector {
    /// Creates a detector in the silence state.
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            in_speech: false,
            contrary_run: 0,
        }
    }

    /// Classifies one frame of samples and updates the confirmed state.
    pub fn classify(&mut self, samples: &[i16]) -> Classification {
        let level = calculate_rms(samples);
        let raw_speech = level > self.config.threshold;

        if raw_speech == self.in_speech {
            self.contrary_run = 0;
        } else {
            self.contrary_run += 1;
            if self.contrary_run >= self.config.hysteresis_frames {
                self.in_speech = raw_speech;
                self.contrary_run = 0;
            }
        }

        Classification {
            is_speech: self.in_speech,
            level,
        }
    }

    /// Returns the confirmed state without processing a frame.
    pub fn is_speech(&self) -> bool {
        self.in_speech
    }

    /// Resets the detector to the silence state.
    pub fn reset(&mut self) {
        self.in_speech = false;
        self.contrary_run = 0;
    }

    /// Updates the threshold without resetting state.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.config.threshold = threshold;
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// Returns a normalized value (0.0 to 1.0), where 0.0 is silence,
/// ~0.707 is a full-scale sine wave, and 1.0 is maximum amplitude.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}
