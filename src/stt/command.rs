//! Recognition via an external transcriber command.
//!
//! Keeps the model runtime out of this crate: any program that accepts a
//! WAV path and prints the transcription to stdout works (whisper-cli,
//! whisper.cpp's main binary, a python faster-whisper wrapper, ...).

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::wav::write_wav;
use crate::error::{Result, SottoError};
use crate::stt::engine::{EngineConfig, RecognitionEngine, Transcription};

/// Engine that shells out to an external transcriber per utterance.
///
/// The utterance is written to a temporary WAV file and the command is
/// invoked with the model name, compute device and the file path. Stdout
/// is the transcription.
pub struct CommandEngine {
    program: String,
    config: EngineConfig,
    work_dir: PathBuf,
    invocation: AtomicU64,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            program: program.into(),
            config,
            work_dir: std::env::temp_dir(),
            invocation: AtomicU64::new(0),
        }
    }

    /// Overrides the directory for temporary WAV files.
    pub fn with_work_dir(mut self, dir: PathBuf) -> Self {
        self.work_dir = dir;
        self
    }

    fn temp_wav_path(&self) -> PathBuf {
        let n = self.invocation.fetch_add(1, Ordering::Relaxed);
        self.work_dir
            .join(format!("sotto-{}-{}.wav", std::process::id(), n))
    }
}

impl RecognitionEngine for CommandEngine {
    fn transcribe(&self, samples: &[i16], sample_rate: u32) -> Result<Transcription> {
        let wav_path = self.temp_wav_path();
        write_wav(&wav_path, samples, sample_rate)?;

        let output = Command::new(&self.program)
            .arg("--model")
            .arg(&self.config.model_size)
            .arg("--device")
            .arg(self.config.device.as_str())
            .arg(&wav_path)
            .output();

        // The WAV is only needed for the duration of the call.
        if let Err(e) = std::fs::remove_file(&wav_path) {
            eprintln!("sotto: failed to remove {}: {}", wav_path.display(), e);
        }

        let output = output.map_err(|e| SottoError::Other(format!(
            "failed to run '{}': {}",
            self.program, e
        )))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SottoError::Other(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Transcription::plain(text))
    }

    fn model_name(&self) -> &str {
        &self.config.model_size
    }

    fn is_ready(&self) -> bool {
        Command::new(&self.program)
            .arg("--help")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}
