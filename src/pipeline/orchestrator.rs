//! Capture-to-text pipeline that runs from startup until shutdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::audio::energy::{DetectorConfig, EnergyDetector, FrameFilter, NoFilter};
use crate::audio::source::AudioSource;
use crate::audio::wav::{frame_samples, write_wav};
use crate::defaults;
use crate::dispatch::dispatcher::{Dispatcher, DispatcherConfig};
use crate::error::Result;
use crate::pipeline::sink::TextSink;
use crate::pipeline::types::{AudioFrame, LabeledFrame, PipelineEvent, Utterance};
use crate::segment::{SegmentOutput, Segmenter, SegmenterConfig};
use crate::stt::engine::RecognitionEngine;

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Energy detector configuration.
    pub detector: DetectorConfig,
    /// Segmenter configuration.
    pub segmenter: SegmenterConfig,
    /// Dispatcher configuration.
    pub dispatcher: DispatcherConfig,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frame duration in milliseconds.
    pub frame_ms: u32,
    /// How often the capture thread polls the source.
    pub poll_interval: Duration,
    /// Directory for debug WAV dumps of finalized utterances.
    pub dump_dir: PathBuf,
    /// Whether debug dumps start enabled. Togglable later through
    /// [`PipelineHandle::set_debug`].
    pub debug_dump: bool,
    /// Optional event sender for observers (non-blocking delivery).
    pub event_tx: Option<Sender<PipelineEvent>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            segmenter: SegmenterConfig::default(),
            dispatcher: DispatcherConfig::default(),
            sample_rate: defaults::SAMPLE_RATE,
            frame_ms: defaults::FRAME_MS,
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
            dump_dir: std::env::temp_dir().join("sotto"),
            debug_dump: false,
            event_tx: None,
        }
    }
}

/// Handle to a running pipeline.
pub struct PipelineHandle {
    /// Flag to signal shutdown.
    running: Arc<AtomicBool>,
    /// Flag enabling debug WAV dumps, togglable at runtime.
    debug: Arc<AtomicBool>,
    /// Join handles for spawned threads.
    threads: Vec<JoinHandle<()>>,
    /// Receiver for the sink's finish() result.
    result_rx: Option<Receiver<Option<String>>>,
}

impl PipelineHandle {
    /// Stops the pipeline gracefully and returns the sink's accumulated
    /// result.
    ///
    /// Waits up to 5s for queued recognition to finish, then 1s for
    /// threads to exit. After the deadline, remaining threads are
    /// detached — they die with the process.
    pub fn stop(mut self) -> Option<String> {
        self.running.store(false, Ordering::SeqCst);

        // The result may arrive before every thread has exited, so take it
        // first. Allow up to 5s for in-flight recognition to complete.
        let result = self
            .result_rx
            .as_ref()
            .and_then(|rx| rx.recv_timeout(Duration::from_secs(5)).ok().flatten());

        let deadline = Instant::now() + Duration::from_secs(1);
        let poll_interval = Duration::from_millis(50);

        loop {
            let mut remaining = Vec::new();
            for handle in self.threads.drain(..) {
                if handle.is_finished() {
                    if let Err(panic_info) = handle.join() {
                        let msg = panic_info
                            .downcast_ref::<&str>()
                            .copied()
                            .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                            .unwrap_or("unknown panic");
                        eprintln!("sotto: pipeline thread panicked: {msg}");
                    }
                } else {
                    remaining.push(handle);
                }
            }
            self.threads = remaining;

            if self.threads.is_empty() {
                break;
            }

            if Instant::now() >= deadline {
                eprintln!(
                    "sotto: shutdown timeout — {} thread(s) still running, detaching",
                    self.threads.len()
                );
                break;
            }

            thread::sleep(poll_interval);
        }

        result
    }

    /// Waits for a finite source to drain, then returns the sink's result.
    ///
    /// Blocks until the capture thread has exhausted the source and every
    /// queued utterance has been recognized. Only meaningful for finite
    /// sources; a live source never drains on its own.
    pub fn join(mut self) -> Option<String> {
        let result = self
            .result_rx
            .as_ref()
            .and_then(|rx| rx.recv().ok().flatten());
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                eprintln!("sotto: pipeline thread panicked");
            }
        }
        result
    }

    /// Returns true if the pipeline is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Toggles debug WAV dumps of finalized utterances at runtime.
    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::SeqCst);
    }
}

/// The pipeline: AudioSource → detector → segmenter → dispatcher → sink.
///
/// Two thread groups: a capture thread owns the source, detector and
/// segmenter; the dispatcher's workers own the engine calls. Finalized
/// utterances cross between them through the bounded utterance queue.
pub struct Pipeline {
    config: PipelineConfig,
    filter: Box<dyn FrameFilter>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            filter: Box::new(NoFilter),
        }
    }

    /// Installs a pre-detection frame filter (noise gate, high-pass, ...).
    pub fn with_filter(mut self, filter: Box<dyn FrameFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Starts the pipeline.
    pub fn start(
        self,
        mut source: Box<dyn AudioSource>,
        engine: Arc<dyn RecognitionEngine>,
        sink: Box<dyn TextSink>,
    ) -> Result<PipelineHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let debug = Arc::new(AtomicBool::new(self.config.debug_dump));
        let (result_tx, result_rx) = bounded(1);

        source.start()?;

        let dispatcher = Dispatcher::spawn(
            engine,
            sink,
            self.config.dispatcher.clone(),
            self.config.event_tx.clone(),
        );

        let capture_running = Arc::clone(&running);
        let capture_debug = Arc::clone(&debug);
        let config = self.config;
        let filter = self.filter;
        let capture_handle = thread::Builder::new()
            .name("sotto-capture".to_string())
            .spawn(move || {
                capture_loop(
                    source,
                    filter,
                    dispatcher,
                    config,
                    capture_running,
                    capture_debug,
                    result_tx,
                );
            })
            .map_err(|e| crate::error::SottoError::Other(format!(
                "failed to spawn capture thread: {}",
                e
            )))?;

        Ok(PipelineHandle {
            running,
            debug,
            threads: vec![capture_handle],
            result_rx: Some(result_rx),
        })
    }
}

const MAX_CONSECUTIVE_ERRORS: u32 = 10;

fn capture_loop(
    mut source: Box<dyn AudioSource>,
    mut filter: Box<dyn FrameFilter>,
    dispatcher: Dispatcher,
    config: PipelineConfig,
    running: Arc<AtomicBool>,
    debug: Arc<AtomicBool>,
    result_tx: Sender<Option<String>>,
) {
    let source_is_finite = source.is_finite();
    let frame_len = frame_samples(config.sample_rate, config.frame_ms);
    let mut detector = EnergyDetector::new(config.detector);
    let mut segmenter = Segmenter::new(config.segmenter);
    let mut pending: Vec<i16> = Vec::with_capacity(frame_len * 4);
    let mut sequence: u64 = 0;
    let mut consecutive_errors: u32 = 0;

    while running.load(Ordering::SeqCst) {
        let samples = match source.read_samples() {
            Ok(s) => {
                consecutive_errors = 0;
                s
            }
            Err(e) => {
                consecutive_errors += 1;
                emit(
                    &config.event_tx,
                    PipelineEvent::SourceError {
                        message: e.to_string(),
                    },
                );
                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    eprintln!(
                        "sotto: audio capture failed {consecutive_errors} times in a row: {e}"
                    );
                    break;
                }
                thread::sleep(config.poll_interval);
                continue;
            }
        };

        if samples.is_empty() {
            if source_is_finite {
                // File or scripted source exhausted.
                break;
            }
            // Live source: empty reads are normal while the device warms
            // up. Keep polling.
            thread::sleep(config.poll_interval);
            continue;
        }

        pending.extend_from_slice(&samples);
        while pending.len() >= frame_len {
            let mut frame_samples: Vec<i16> = pending.drain(..frame_len).collect();
            filter.apply(&mut frame_samples);
            let classification = detector.classify(&frame_samples);
            let frame = AudioFrame::new(frame_samples, Instant::now(), sequence);
            sequence += 1;

            let output = segmenter.push(LabeledFrame::new(
                frame,
                classification.is_speech,
                classification.level,
            ));
            handle_segment_output(output, &dispatcher, &config, &debug);
        }

        if !source_is_finite {
            thread::sleep(config.poll_interval);
        }
    }

    // Whatever is mid-accumulation at shutdown still counts.
    handle_segment_output(segmenter.flush(), &dispatcher, &config, &debug);

    if let Err(e) = source.stop() {
        eprintln!("sotto: failed to stop audio source: {e}");
    }

    let result = dispatcher.shutdown();
    emit(&config.event_tx, PipelineEvent::Stopped);
    if result_tx.send(result).is_err() {
        eprintln!("sotto: pipeline result receiver already dropped");
    }
}

fn handle_segment_output(
    output: SegmentOutput,
    dispatcher: &Dispatcher,
    config: &PipelineConfig,
    debug: &Arc<AtomicBool>,
) {
    match output {
        SegmentOutput::None => {}
        SegmentOutput::SpeechStarted { frame_sequence } => {
            emit(
                &config.event_tx,
                PipelineEvent::SpeechStarted { frame_sequence },
            );
        }
        SegmentOutput::Finalized(utterance) => {
            let duration_ms =
                (utterance.samples.len() as u64 * 1000 / config.sample_rate as u64) as u32;
            emit(
                &config.event_tx,
                PipelineEvent::UtteranceFinalized {
                    seq: utterance.seq,
                    duration_ms,
                },
            );
            if debug.load(Ordering::SeqCst) {
                dump_utterance(&utterance, config);
            }
            dispatcher.enqueue(utterance);
        }
        SegmentOutput::Discarded { duration_ms } => {
            emit(
                &config.event_tx,
                PipelineEvent::UtteranceDiscarded { duration_ms },
            );
        }
    }
}

fn dump_utterance(utterance: &Utterance, config: &PipelineConfig) {
    if let Err(e) = std::fs::create_dir_all(&config.dump_dir) {
        eprintln!("sotto: failed to create dump directory: {e}");
        return;
    }
    let path = config
        .dump_dir
        .join(format!("utterance_{:06}.wav", utterance.seq));
    if let Err(e) = write_wav(&path, &utterance.samples, config.sample_rate) {
        eprintln!("sotto: failed to write debug dump: {e}");
    }
}

fn emit(events: &Option<Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MockAudioSource;
    use crate::error::SottoError;
    use crate::pipeline::sink::CollectorSink;
    use crate::stt::engine::MockEngine;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            detector: DetectorConfig {
                threshold: 0.015,
                hysteresis_frames: 1,
            },
            segmenter: SegmenterConfig {
                frame_ms: 20,
                pre_roll_frames: 2,
                trail_pad_frames: 2,
                finalize_silence_frames: 5,
                min_utterance_frames: 5,
                max_utterance_frames: 200,
            },
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.frame_ms, 20);
        assert_eq!(config.poll_interval, Duration::from_millis(10));
        assert!(config.event_tx.is_none());
    }

    #[test]
    fn test_handle_is_running() {
        let running = Arc::new(AtomicBool::new(true));
        let handle = PipelineHandle {
            running: running.clone(),
            debug: Arc::new(AtomicBool::new(false)),
            threads: vec![],
            result_rx: None,
        };

        assert!(handle.is_running());
        running.store(false, Ordering::SeqCst);
        assert!(!handle.is_running());
    }

    #[test]
    fn test_handle_set_debug_toggles_flag() {
        let debug = Arc::new(AtomicBool::new(false));
        let handle = PipelineHandle {
            running: Arc::new(AtomicBool::new(true)),
            debug: debug.clone(),
            threads: vec![],
            result_rx: None,
        };

        handle.set_debug(true);
        assert!(debug.load(Ordering::SeqCst));
        handle.set_debug(false);
        assert!(!debug.load(Ordering::SeqCst));
    }

    #[test]
    fn test_handle_stop_returns_none_without_result() {
        let handle = PipelineHandle {
            running: Arc::new(AtomicBool::new(true)),
            debug: Arc::new(AtomicBool::new(false)),
            threads: vec![],
            result_rx: None,
        };
        assert!(handle.stop().is_none());
    }

    #[test]
    fn test_handle_stop_returns_result_from_channel() {
        let (result_tx, result_rx) = bounded(1);
        result_tx.send(Some("collected text".to_string())).unwrap();
        drop(result_tx);

        let handle = PipelineHandle {
            running: Arc::new(AtomicBool::new(true)),
            debug: Arc::new(AtomicBool::new(false)),
            threads: vec![],
            result_rx: Some(result_rx),
        };
        assert_eq!(handle.stop(), Some("collected text".to_string()));
    }

    #[test]
    fn test_start_fails_when_source_fails_to_start() {
        let pipeline = Pipeline::new(fast_config());
        let source = Box::new(MockAudioSource::new().with_start_failure());
        let engine: Arc<dyn RecognitionEngine> = Arc::new(MockEngine::new("m"));

        let result = pipeline.start(source, engine, Box::new(CollectorSink::new()));
        assert!(matches!(
            result.map(|_| ()),
            Err(SottoError::DeviceUnavailable { .. })
        ));
    }

    #[test]
    fn test_pipeline_transcribes_scripted_speech() {
        let pipeline = Pipeline::new(fast_config());
        let source = Box::new(
            MockAudioSource::new()
                .with_silence(5)
                .with_speech(30, 5000)
                .with_silence(20),
        );
        let engine: Arc<dyn RecognitionEngine> =
            Arc::new(MockEngine::new("m").with_response("hello"));

        let handle = pipeline
            .start(source, engine, Box::new(CollectorSink::new()))
            .unwrap();
        assert!(handle.is_running());

        // The finite source drains on its own; stop collects the result.
        thread::sleep(Duration::from_millis(200));
        assert_eq!(handle.stop(), Some("hello".to_string()));
    }

    #[test]
    fn test_pipeline_silence_only_produces_nothing() {
        let pipeline = Pipeline::new(fast_config());
        let source = Box::new(MockAudioSource::new().with_silence(40));
        let engine: Arc<dyn RecognitionEngine> =
            Arc::new(MockEngine::new("m").with_response("should not appear"));

        let handle = pipeline
            .start(source, engine, Box::new(CollectorSink::new()))
            .unwrap();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(handle.stop(), None);
    }

    #[test]
    fn test_pipeline_flushes_partial_utterance_on_exhaustion() {
        // Speech with no trailing silence: the flush path must still
        // dispatch it.
        let pipeline = Pipeline::new(fast_config());
        let source = Box::new(MockAudioSource::new().with_speech(20, 5000));
        let engine: Arc<dyn RecognitionEngine> =
            Arc::new(MockEngine::new("m").with_response("tail"));

        let handle = pipeline
            .start(source, engine, Box::new(CollectorSink::new()))
            .unwrap();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(handle.stop(), Some("tail".to_string()));
    }

    #[test]
    fn test_pipeline_survives_transient_read_errors() {
        let pipeline = Pipeline::new(fast_config());
        let source = Box::new(
            MockAudioSource::new()
                .with_silence(3)
                .with_read_failure("hiccup")
                .with_speech(20, 5000)
                .with_silence(10),
        );
        let engine: Arc<dyn RecognitionEngine> =
            Arc::new(MockEngine::new("m").with_response("recovered"));

        let handle = pipeline
            .start(source, engine, Box::new(CollectorSink::new()))
            .unwrap();
        thread::sleep(Duration::from_millis(250));
        assert_eq!(handle.stop(), Some("recovered".to_string()));
    }

    #[test]
    fn test_muting_filter_suppresses_detection() {
        struct Mute;
        impl FrameFilter for Mute {
            fn apply(&mut self, frame: &mut [i16]) {
                frame.fill(0);
            }
        }

        let pipeline = Pipeline::new(fast_config()).with_filter(Box::new(Mute));
        let source = Box::new(
            MockAudioSource::new()
                .with_silence(5)
                .with_speech(30, 5000)
                .with_silence(20),
        );
        let engine: Arc<dyn RecognitionEngine> =
            Arc::new(MockEngine::new("m").with_response("should not appear"));

        let handle = pipeline
            .start(source, engine, Box::new(CollectorSink::new()))
            .unwrap();
        thread::sleep(Duration::from_millis(150));
        assert_eq!(handle.stop(), None);
    }

    #[test]
    fn test_pipeline_emits_lifecycle_events() {
        let (tx, rx) = crossbeam_channel::bounded(64);
        let mut config = fast_config();
        config.event_tx = Some(tx);

        let pipeline = Pipeline::new(config);
        let source = Box::new(
            MockAudioSource::new()
                .with_silence(5)
                .with_speech(30, 5000)
                .with_silence(20),
        );
        let engine: Arc<dyn RecognitionEngine> = Arc::new(MockEngine::new("m").with_response("x"));

        let handle = pipeline
            .start(source, engine, Box::new(CollectorSink::new()))
            .unwrap();
        thread::sleep(Duration::from_millis(200));
        handle.stop();

        let events: Vec<PipelineEvent> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::SpeechStarted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::UtteranceFinalized { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Recognized { .. })));
        assert_eq!(events.last(), Some(&PipelineEvent::Stopped));
    }

    #[test]
    fn test_pipeline_restart_is_clean() {
        // Two consecutive sessions must not share state: sequence numbers,
        // detector state and the queue all start fresh.
        for _ in 0..2 {
            let pipeline = Pipeline::new(fast_config());
            let source = Box::new(
                MockAudioSource::new()
                    .with_silence(3)
                    .with_speech(20, 5000)
                    .with_silence(15),
            );
            let engine: Arc<dyn RecognitionEngine> =
                Arc::new(MockEngine::new("m").with_response("session"));

            let handle = pipeline
                .start(source, engine, Box::new(CollectorSink::new()))
                .unwrap();
            thread::sleep(Duration::from_millis(150));
            assert_eq!(handle.stop(), Some("session".to_string()));
        }
    }

    #[test]
    fn test_debug_dump_writes_wav_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fast_config();
        config.dump_dir = dir.path().to_path_buf();
        config.debug_dump = true;

        let pipeline = Pipeline::new(config);
        let source = Box::new(
            MockAudioSource::new()
                .with_silence(3)
                .with_speech(20, 5000)
                .with_silence(15),
        );
        let engine: Arc<dyn RecognitionEngine> = Arc::new(MockEngine::new("m"));

        let handle = pipeline
            .start(source, engine, Box::new(CollectorSink::new()))
            .unwrap();
        thread::sleep(Duration::from_millis(150));
        handle.stop();

        let dumps: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "wav"))
            .collect();
        assert!(!dumps.is_empty(), "expected at least one debug dump");
    }
}
