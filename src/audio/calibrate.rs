//! Microphone calibration against ambient noise.
//!
//! Samples a short stretch of input assumed to be room tone, measures the
//! noise floor, and derives a detector threshold a margin above it. Results
//! are cached per device with an expiry so calibration does not delay every
//! session start.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::audio::energy::calculate_rms;
use crate::audio::source::AudioSource;
use crate::audio::wav::frame_samples;
use crate::defaults;
use crate::error::{Result, SottoError};

/// Configuration for the calibrator.
#[derive(Debug, Clone)]
pub struct CalibratorConfig {
    pub sample_rate: u32,
    pub frame_ms: u32,
    /// How much input to sample for the noise floor.
    pub duration_ms: u32,
    /// Multiplier over the measured floor.
    pub margin: f32,
    /// Lower clamp for the derived threshold.
    pub floor: f32,
    /// Upper clamp for the derived threshold.
    pub ceiling: f32,
}

impl Default for CalibratorConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
            duration_ms: defaults::CALIBRATION_MS,
            margin: defaults::CALIBRATION_MARGIN,
            floor: defaults::CALIBRATION_FLOOR,
            ceiling: defaults::CALIBRATION_CEILING,
        }
    }
}

/// Derives an adaptive detector threshold from ambient noise.
pub struct Calibrator {
    config: CalibratorConfig,
}

impl Calibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self { config }
    }

    /// Samples the source and returns a threshold above its noise floor.
    ///
    /// The source must already be started. The noise floor is the mean
    /// per-frame RMS over the sampling window; the returned threshold is
    /// `floor × margin` clamped to the configured range. A finite source
    /// that ends early calibrates on whatever it produced.
    pub fn measure(&self, source: &mut dyn AudioSource) -> Result<f32> {
        let frame_len = frame_samples(self.config.sample_rate, self.config.frame_ms);
        let target = (self.config.duration_ms / self.config.frame_ms).max(1) as usize;
        let mut pending: Vec<i16> = Vec::with_capacity(frame_len * 4);
        let mut levels: Vec<f32> = Vec::with_capacity(target);

        while levels.len() < target {
            let samples = source.read_samples()?;
            if samples.is_empty() {
                if source.is_finite() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(defaults::POLL_INTERVAL_MS));
                continue;
            }
            pending.extend_from_slice(&samples);
            while pending.len() >= frame_len && levels.len() < target {
                let frame: Vec<i16> = pending.drain(..frame_len).collect();
                levels.push(calculate_rms(&frame));
            }
        }

        if levels.is_empty() {
            return Err(SottoError::Other(
                "no audio captured during calibration".to_string(),
            ));
        }

        let baseline = levels.iter().sum::<f32>() / levels.len() as f32;
        Ok(self.threshold_from_baseline(baseline))
    }

    fn threshold_from_baseline(&self, baseline: f32) -> f32 {
        (baseline * self.config.margin).clamp(self.config.floor, self.config.ceiling)
    }
}

/// Per-device calibration results, persisted as TOML next to the config
/// file. Entries expire after 24 hours; switching devices forces a fresh
/// measurement because each entry is keyed by device name.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CalibrationCache {
    #[serde(default)]
    devices: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CacheEntry {
    threshold: f32,
    calibrated_at: u64,
}

impl CalibrationCache {
    /// Loads the cache, treating a missing or unreadable file as empty.
    pub fn load(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|text| toml::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string(self)
            .map_err(|e| SottoError::Other(format!("failed to serialize calibration: {e}")))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Returns the cached threshold for `device` if it has not expired.
    pub fn fresh_threshold(&self, device: &str) -> Option<f32> {
        self.fresh_threshold_at(device, unix_now())
    }

    fn fresh_threshold_at(&self, device: &str, now: u64) -> Option<f32> {
        let entry = self.devices.get(device)?;
        let age = now.saturating_sub(entry.calibrated_at);
        (age <= defaults::CALIBRATION_TTL_SECS).then_some(entry.threshold)
    }

    pub fn record(&mut self, device: &str, threshold: f32) {
        self.devices.insert(
            device.to_string(),
            CacheEntry {
                threshold,
                calibrated_at: unix_now(),
            },
        );
    }

    /// Default cache location, next to the config file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("sotto")
            .join("calibration.toml")
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
