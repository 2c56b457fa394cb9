//! Default configuration constants for sotto.
//!
//! Shared across the config types and component constructors so the same
//! tuning appears everywhere.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and keeps the capture path
/// cheap relative to full-band audio.
pub const SAMPLE_RATE: u32 = 16000;

/// Default frame duration in milliseconds.
///
/// 20ms frames give the detector enough samples for a stable RMS estimate
/// while keeping segmentation latency well under perception.
pub const FRAME_MS: u32 = 20;

/// Default RMS threshold (0.0 to 1.0) separating speech from silence.
///
/// Tuned for typical microphone input levels; roughly 500/32768 in raw
/// 16-bit amplitude terms.
pub const SILENCE_THRESHOLD: f32 = 0.015;

/// Default hysteresis confirmation count.
///
/// A speech/silence transition is only accepted after this many consecutive
/// frames cross the threshold in the same direction, suppressing flicker on
/// transient noise.
pub const HYSTERESIS_FRAMES: u32 = 3;

/// Default pre-roll (lead padding) duration in milliseconds.
///
/// Silence frames kept in a ring buffer while idle and prepended when speech
/// starts, so soft onsets (plosives, fricatives) are not clipped.
pub const PRE_ROLL_MS: u32 = 500;

/// Default trailing padding kept on a finalized utterance, in milliseconds.
pub const TRAIL_PAD_MS: u32 = 300;

/// Default silence run that finalizes an utterance, in milliseconds.
pub const MAX_SILENCE_MS: u32 = 600;

/// Default minimum utterance duration in milliseconds.
///
/// Anything shorter is treated as noise and discarded, not dispatched.
pub const MIN_UTTERANCE_MS: u32 = 500;

/// Default maximum utterance duration in milliseconds.
///
/// Bounds memory and latency: at this point the buffer is force-finalized
/// and a new utterance starts immediately with no pre-roll.
pub const MAX_UTTERANCE_MS: u32 = 10_000;

/// Default dispatch queue capacity, in utterances.
pub const QUEUE_CAPACITY: usize = 8;

/// Default recognition timeout in seconds.
///
/// A call still running past this is abandoned; its late result is discarded.
pub const RECOGNITION_TIMEOUT_SECS: u64 = 30;

/// Default recognition model size (engine-interpreted, e.g. Whisper family).
pub const MODEL_SIZE: &str = "small";

/// Default ambient-noise sampling duration for calibration, in
/// milliseconds.
pub const CALIBRATION_MS: u32 = 1000;

/// Multiplier applied to the measured noise floor to derive an adaptive
/// detector threshold.
pub const CALIBRATION_MARGIN: f32 = 3.0;

/// Lower clamp for a calibrated threshold.
///
/// Roughly 300/32768 in raw 16-bit amplitude terms.
pub const CALIBRATION_FLOOR: f32 = 0.009;

/// Upper clamp for a calibrated threshold.
///
/// Roughly 1000/32768 in raw 16-bit amplitude terms.
pub const CALIBRATION_CEILING: f32 = 0.031;

/// How long a cached per-device calibration stays valid, in seconds.
pub const CALIBRATION_TTL_SECS: u64 = 24 * 60 * 60;

/// Capture poll interval in milliseconds.
///
/// The capture thread asks the source for samples at this cadence; sources
/// buffer internally between polls.
pub const POLL_INTERVAL_MS: u64 = 10;
