//! Audio capture and speech detection.
//!
//! Sources produce raw 16-bit mono PCM; the energy detector labels fixed
//! frames as speech or silence for the segmenter downstream.

pub mod calibrate;
#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod energy;
pub mod source;
pub mod wav;

pub use calibrate::{CalibrationCache, Calibrator, CalibratorConfig};
#[cfg(feature = "cpal-audio")]
pub use capture::{CpalAudioSource, list_devices};
pub use energy::{
    Classification, DetectorConfig, EnergyDetector, FrameFilter, NoFilter, calculate_rms,
};
pub use source::{AudioSource, AudioSourceConfig, MockAudioSource};
pub use wav::{WavAudioSource, frame_samples, write_wav};
