//! Live microphone capture using CPAL.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio::source::AudioSource;
use crate::audio::wav::{mix_to_mono, resample};
use crate::defaults;
use crate::error::{Result, SottoError};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// Suppresses the ALSA/JACK/PipeWire chatter CPAL triggers while probing
/// backends. Harmless noise, but it corrupts meter output and confuses
/// users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` on file descriptor 2. Safe as long as no
/// other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Device names preferred over raw ALSA devices; these follow the
/// desktop's input selection.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "pulseaudio"];

/// Device name patterns that are never useful for voice input.
const FILTERED_PATTERNS: &[&str] = &[
    "surround", "front:", "rear:", "center:", "side:", "hdmi", "s/pdif", "digital output",
];

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES.iter().any(|p| lower.contains(p))
}

fn is_filtered_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS.iter().any(|p| lower.contains(p))
}

/// List usable audio input devices.
///
/// Filters out channel-split and digital-output devices and marks the
/// preferred server devices with "\[recommended\]".
pub fn list_devices() -> Result<Vec<String>> {
    let devices = with_suppressed_stderr(|| {
        cpal::default_host()
            .input_devices()
            .map(|iter| iter.collect::<Vec<_>>())
    })
    .map_err(|e| SottoError::StreamInterrupted {
        message: format!("failed to enumerate input devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        let Ok(name) = device.name() else { continue };
        if is_filtered_device(&name) {
            continue;
        }
        if is_preferred_device(&name) {
            names.push(format!("{} [recommended]", name));
        } else {
            names.push(name);
        }
    }
    Ok(names)
}

/// Pick the input device: by name if given, otherwise a preferred server
/// device, otherwise the system default.
fn select_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host
                .input_devices()
                .map_err(|e| SottoError::StreamInterrupted {
                    message: format!("failed to enumerate devices: {}", e),
                })?;
            for device in devices {
                if device.name().is_ok_and(|n| n == name) {
                    return Ok(device);
                }
            }
            return Err(SottoError::DeviceUnavailable {
                device: name.to_string(),
            });
        }

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if device.name().is_ok_and(|n| is_preferred_device(&n)) {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| SottoError::DeviceUnavailable {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched through the Mutex in
/// CpalAudioSource, so it is never accessed from two threads at once.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Microphone source capturing 16-bit PCM mono at the pipeline rate.
///
/// Tries the preferred format (i16 mono at the target rate) first, then
/// f32, then falls back to the device's native config with software
/// mix-down and resampling. The CPAL callback appends into a shared
/// buffer; `read_samples` drains it, making the source pull-based like
/// every other `AudioSource`.
pub struct CpalAudioSource {
    device: cpal::Device,
    stream: Mutex<Option<SendableStream>>,
    buffer: Arc<Mutex<Vec<i16>>>,
    callback_count: Arc<AtomicU64>,
    sample_rate: u32,
}

impl CpalAudioSource {
    /// Open the named device, or the best default if `None`.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = select_device(device_name)?;
        Ok(Self {
            device,
            stream: Mutex::new(None),
            buffer: Arc::new(Mutex::new(Vec::new())),
            callback_count: Arc::new(AtomicU64::new(0)),
            sample_rate: defaults::SAMPLE_RATE,
        })
    }

    fn build_stream(&self) -> Result<cpal::Stream> {
        let preferred = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            eprintln!("sotto: audio stream error: {}", err);
        };

        // i16 mono at the target rate; PipeWire/PulseAudio convert
        // transparently.
        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        // f32 for devices that only expose float formats.
        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &preferred,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(data.iter().map(f32_to_i16));
                }
            },
            err_callback,
            None,
        ) {
            return Ok(stream);
        }

        self.build_stream_native()
    }

    /// Capture at the device's native config and convert in software.
    /// Some PipeWire-ALSA setups accept non-native configs but never
    /// deliver data, so this path also serves as the runtime fallback.
    fn build_stream_native(&self) -> Result<cpal::Stream> {
        use cpal::SampleFormat;

        let native = self
            .device
            .default_input_config()
            .map_err(|e| SottoError::StreamInterrupted {
                message: format!("failed to query default input config: {}", e),
            })?;

        let native_rate = native.sample_rate().0;
        let native_channels = native.channels();
        let target_rate = self.sample_rate;
        let stream_config: cpal::StreamConfig = native.clone().into();

        eprintln!(
            "sotto: using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            native.sample_format(),
        );

        let err_callback = |err| {
            eprintln!("sotto: audio stream error: {}", err);
        };

        let buffer = Arc::clone(&self.buffer);
        let counter = Arc::clone(&self.callback_count);

        match native.sample_format() {
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let mono = mix_to_mono(data, native_channels);
                        let converted = resample(&mono, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| SottoError::StreamInterrupted {
                    message: format!("failed to build native i16 stream: {}", e),
                }),
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let as_i16: Vec<i16> = data.iter().map(f32_to_i16).collect();
                        let mono = mix_to_mono(&as_i16, native_channels);
                        let converted = resample(&mono, native_rate, target_rate);
                        if let Ok(mut buf) = buffer.lock() {
                            buf.extend_from_slice(&converted);
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| SottoError::StreamInterrupted {
                    message: format!("failed to build native f32 stream: {}", e),
                }),
            fmt => Err(SottoError::StreamInterrupted {
                message: format!(
                    "unsupported native sample format {:?}; try another device",
                    fmt
                ),
            }),
        }
    }
}

fn f32_to_i16(sample: &f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        {
            let guard = lock_stream(&self.stream)?;
            if guard.is_some() {
                return Ok(());
            }
        }

        let stream = self.build_stream()?;
        stream.play().map_err(|e| SottoError::StreamInterrupted {
            message: format!("failed to start audio stream: {}", e),
        })?;

        // Give the callback a moment to prove the config actually delivers
        // data; some PipeWire-ALSA setups go silent instead of erroring.
        std::thread::sleep(std::time::Duration::from_millis(200));

        let final_stream = if self.callback_count.load(Ordering::Relaxed) == 0 {
            drop(stream);
            if let Ok(mut buf) = self.buffer.lock() {
                buf.clear();
            }
            let native = self.build_stream_native()?;
            native.play().map_err(|e| SottoError::StreamInterrupted {
                message: format!("failed to start native audio stream: {}", e),
            })?;
            native
        } else {
            stream
        };

        *lock_stream(&self.stream)? = Some(SendableStream(final_stream));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut guard = lock_stream(&self.stream)?;
        if let Some(stream) = guard.take() {
            stream.0.pause().map_err(|e| SottoError::StreamInterrupted {
                message: format!("failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<i16>> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|e| SottoError::StreamInterrupted {
                message: format!("failed to lock audio buffer: {}", e),
            })?;
        Ok(std::mem::take(&mut *buffer))
    }

    fn is_finite(&self) -> bool {
        false
    }
}

fn lock_stream(
    stream: &Mutex<Option<SendableStream>>,
) -> Result<std::sync::MutexGuard<'_, Option<SendableStream>>> {
    stream.lock().map_err(|e| SottoError::StreamInterrupted {
        message: format!("failed to lock stream: {}", e),
    })
}
