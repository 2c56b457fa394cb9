use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;

use sotto::cli::{Cli, Commands};
use sotto::config::Config;
use sotto::pipeline::orchestrator::Pipeline;
use sotto::pipeline::sink::CollectorSink;
use sotto::stt::command::CommandEngine;
use sotto::stt::engine::RecognitionEngine;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let config = apply_cli_overrides(config, &cli);
    config.validate()?;

    match cli.command {
        None => run_dictation(&config),
        Some(Commands::Devices) => list_audio_devices(),
        Some(Commands::Calibrate) => run_calibrate(&config),
        Some(Commands::Meter { seconds }) => run_meter(&config, seconds),
        Some(Commands::Wav { path }) => run_wav(&config, &path),
    }
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/sotto/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        Config::load_or_default(&Config::default_path())?
    };
    Ok(config.with_env_overrides())
}

fn apply_cli_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(device) = &cli.device {
        config.audio.device = Some(device.clone());
    }
    if let Some(model) = &cli.model {
        config.engine.model = model.clone();
    }
    if let Some(command) = &cli.engine {
        config.engine.command = Some(command.clone());
    }
    if let Some(workers) = cli.workers {
        config.dispatch.workers = workers;
    }
    if cli.debug_audio {
        config.debug_audio = true;
    }
    config
}

/// Build the recognition engine from config.
fn build_engine(config: &Config) -> Result<Arc<dyn RecognitionEngine>> {
    let Some(command) = &config.engine.command else {
        bail!(
            "no recognizer configured; set `command` under [engine] in {} \
             or pass --engine <COMMAND>",
            Config::default_path().display()
        );
    };
    let engine = CommandEngine::new(command.clone(), config.engine_config());
    if !engine.is_ready() {
        bail!(
            "recognizer '{}' is not runnable; check that it is installed \
             and on PATH",
            command
        );
    }
    Ok(Arc::new(engine))
}

/// Live dictation from the microphone until Enter is pressed.
#[cfg(feature = "cpal-audio")]
fn run_dictation(config: &Config) -> Result<()> {
    use sotto::audio::capture::CpalAudioSource;
    use sotto::pipeline::sink::StdoutSink;

    let engine = build_engine(config)?;

    let mut pipeline_config = config.pipeline_config();
    if config.detector.auto_calibrate {
        pipeline_config.detector.threshold = resolve_threshold(config)?;
    }

    let source = CpalAudioSource::new(config.audio.device.as_deref())?;
    let pipeline = Pipeline::new(pipeline_config);
    let handle = pipeline.start(Box::new(source), engine, Box::new(StdoutSink))?;

    eprintln!("sotto: listening (press Enter to stop)");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    handle.stop();
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn run_dictation(_config: &Config) -> Result<()> {
    bail!("built without the cpal-audio feature; microphone capture is unavailable");
}

/// Returns a detector threshold adapted to the ambient noise level.
///
/// Uses the cached per-device calibration when fresh; otherwise samples
/// the microphone briefly and caches the result.
#[cfg(feature = "cpal-audio")]
fn resolve_threshold(config: &Config) -> Result<f32> {
    use sotto::audio::calibrate::{CalibrationCache, Calibrator};
    use sotto::audio::capture::CpalAudioSource;
    use sotto::audio::source::AudioSource;

    let device = config.audio.device.as_deref().unwrap_or("default");
    let cache_path = CalibrationCache::default_path();
    let mut cache = CalibrationCache::load(&cache_path);

    if let Some(threshold) = cache.fresh_threshold(device) {
        eprintln!("sotto: using cached calibration ({threshold:.4})");
        return Ok(threshold);
    }

    eprintln!("sotto: calibrating microphone (stay quiet for a moment)...");
    let mut source = CpalAudioSource::new(config.audio.device.as_deref())?;
    source.start()?;
    let measured = Calibrator::new(config.calibrator_config()).measure(&mut source);
    source.stop()?;
    let threshold = measured?;

    cache.record(device, threshold);
    if let Err(e) = cache.store(&cache_path) {
        eprintln!("sotto: failed to save calibration: {e}");
    }
    eprintln!("sotto: adaptive threshold {threshold:.4}");
    Ok(threshold)
}

/// Measure ambient noise and cache an adaptive threshold for this device.
#[cfg(feature = "cpal-audio")]
fn run_calibrate(config: &Config) -> Result<()> {
    use sotto::audio::calibrate::{CalibrationCache, Calibrator};
    use sotto::audio::capture::CpalAudioSource;
    use sotto::audio::source::AudioSource;

    eprintln!("sotto: calibrating microphone (stay quiet for a moment)...");
    let mut source = CpalAudioSource::new(config.audio.device.as_deref())?;
    source.start()?;
    let measured = Calibrator::new(config.calibrator_config()).measure(&mut source);
    source.stop()?;
    let threshold = measured?;

    let device = config.audio.device.as_deref().unwrap_or("default");
    let cache_path = CalibrationCache::default_path();
    let mut cache = CalibrationCache::load(&cache_path);
    cache.record(device, threshold);
    cache
        .store(&cache_path)
        .with_context(|| format!("saving {}", cache_path.display()))?;

    println!("threshold = {:.4} (cached for {})", threshold, device);
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn run_calibrate(_config: &Config) -> Result<()> {
    bail!("built without the cpal-audio feature; microphone capture is unavailable");
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = sotto::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    bail!("built without the cpal-audio feature; microphone capture is unavailable");
}

/// Live input level meter on stderr, for picking a detector threshold.
#[cfg(feature = "cpal-audio")]
fn run_meter(config: &Config, seconds: u64) -> Result<()> {
    use sotto::audio::capture::CpalAudioSource;
    use sotto::audio::energy::calculate_rms;
    use sotto::audio::source::AudioSource;
    use std::time::{Duration, Instant};

    let mut source = CpalAudioSource::new(config.audio.device.as_deref())?;
    source.start()?;

    let threshold = config.detector.threshold;
    eprintln!(
        "sotto: level meter for {}s (threshold {:.3} marked with |)",
        seconds, threshold
    );

    const WIDTH: usize = 50;
    // Meter tops out at 0.25 full-scale; normal speech sits well below.
    const FULL_SCALE: f32 = 0.25;
    let marker = ((threshold / FULL_SCALE) * WIDTH as f32) as usize;

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        let samples = source.read_samples()?;
        if samples.is_empty() {
            std::thread::sleep(Duration::from_millis(50));
            continue;
        }
        let rms = calculate_rms(&samples);
        let filled = (((rms / FULL_SCALE) * WIDTH as f32) as usize).min(WIDTH);
        let mut bar = String::with_capacity(WIDTH);
        for i in 0..WIDTH {
            bar.push(if i == marker.min(WIDTH - 1) {
                '|'
            } else if i < filled {
                '#'
            } else {
                ' '
            });
        }
        eprint!("\r[{}] {:.4}", bar, rms);
        std::thread::sleep(Duration::from_millis(100));
    }
    eprintln!();

    source.stop()?;
    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn run_meter(_config: &Config, _seconds: u64) -> Result<()> {
    bail!("built without the cpal-audio feature; microphone capture is unavailable");
}

/// Transcribe a WAV file through the full pipeline and print the text.
fn run_wav(config: &Config, path: &Path) -> Result<()> {
    use sotto::audio::wav::WavAudioSource;

    let engine = build_engine(config)?;
    let source = if path.as_os_str() == "-" {
        WavAudioSource::from_stdin()?
    } else {
        WavAudioSource::from_path(path)
            .with_context(|| format!("reading {}", path.display()))?
    };

    let pipeline = Pipeline::new(config.pipeline_config());
    let handle = pipeline.start(
        Box::new(source),
        engine,
        Box::new(CollectorSink::new()),
    )?;

    match handle.join() {
        Some(text) => println!("{}", text),
        None => eprintln!("sotto: no speech detected"),
    }
    Ok(())
}
