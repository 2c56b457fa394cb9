//! Command-line interface for sotto
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dictation pipeline for Linux
#[derive(Parser, Debug)]
#[command(name = "sotto", version, about = "Dictation pipeline for Linux")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Audio input device (run `sotto devices` for names)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Model size passed to the recognizer (tiny, small, medium, ...)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// External transcriber command; receives a WAV path as last argument
    #[arg(long, value_name = "COMMAND")]
    pub engine: Option<String>,

    /// Recognition workers (1 = strictly serial)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Dump each finalized utterance as a WAV file for troubleshooting
    #[arg(long)]
    pub debug_audio: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Measure ambient noise and cache an adaptive detector threshold
    Calibrate,

    /// Show a live input level meter for threshold tuning
    Meter {
        /// How long to run before exiting
        #[arg(long, value_name = "SECONDS", default_value = "10")]
        seconds: u64,
    },

    /// Transcribe a WAV file through the full pipeline
    Wav {
        /// Path to the WAV file ("-" reads stdin)
        path: PathBuf,
    },
}
