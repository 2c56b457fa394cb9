//! End-to-end pipeline tests through the public API: scripted audio in,
//! recognized text out.

use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use sotto::audio::energy::DetectorConfig;
use sotto::audio::source::MockAudioSource;
use sotto::dispatch::dispatcher::{DispatchPolicy, DispatcherConfig};
use sotto::pipeline::orchestrator::{Pipeline, PipelineConfig};
use sotto::pipeline::sink::CollectorSink;
use sotto::pipeline::types::PipelineEvent;
use sotto::stt::engine::{MockEngine, RecognitionEngine, Transcription};
use sotto::{Result, SegmenterConfig};

const FRAME: usize = 320; // 20ms at 16kHz

fn test_config() -> PipelineConfig {
    PipelineConfig {
        detector: DetectorConfig {
            threshold: 0.015,
            hysteresis_frames: 3,
        },
        segmenter: SegmenterConfig {
            frame_ms: 20,
            pre_roll_frames: 5,
            trail_pad_frames: 3,
            finalize_silence_frames: 5,
            min_utterance_frames: 5,
            max_utterance_frames: 100,
        },
        poll_interval: Duration::from_millis(1),
        ..Default::default()
    }
}

/// Engine that reports the sample count of each call, so tests can check
/// exactly which frames ended up in the dispatched utterance.
struct MeasuringEngine {
    calls: Mutex<Vec<usize>>,
}

impl MeasuringEngine {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl RecognitionEngine for MeasuringEngine {
    fn transcribe(&self, samples: &[i16], _sample_rate: u32) -> Result<Transcription> {
        self.calls.lock().unwrap().push(samples.len());
        Ok(Transcription::plain(format!("len:{}", samples.len())))
    }

    fn model_name(&self) -> &str {
        "measuring"
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[test]
fn test_scripted_speech_reaches_sink() {
    let pipeline = Pipeline::new(test_config());
    let source = MockAudioSource::new()
        .with_silence(8)
        .with_speech(30, 6000)
        .with_silence(12);
    let engine: Arc<dyn RecognitionEngine> =
        Arc::new(MockEngine::new("mock").with_response("the quick brown fox"));

    let handle = pipeline
        .start(Box::new(source), engine, Box::new(CollectorSink::new()))
        .unwrap();
    assert_eq!(handle.join(), Some("the quick brown fox".to_string()));
}

#[test]
fn test_utterance_carries_pre_roll_and_trail_pad() {
    // 5 silent frames, 30 speech frames, 8 silent frames. With hysteresis 3
    // the first two speech frames are recovered from the pre-roll ring, and
    // the trailing padding is trimmed to 3 frames:
    //   5 ring frames + 28 speech-labeled + 2 lagging + 3 trail = 38 frames.
    let pipeline = Pipeline::new(test_config());
    let source = MockAudioSource::new()
        .with_silence(5)
        .with_speech(30, 6000)
        .with_silence(8);
    let engine = Arc::new(MeasuringEngine::new());

    let handle = pipeline
        .start(
            Box::new(source),
            engine.clone(),
            Box::new(CollectorSink::new()),
        )
        .unwrap();
    let text = handle.join();

    let calls = engine.calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[38 * FRAME]);
    assert_eq!(text, Some(format!("len:{}", 38 * FRAME)));
}

#[test]
fn test_two_utterances_arrive_in_order() {
    let pipeline = Pipeline::new(test_config());
    let source = MockAudioSource::new()
        .with_silence(5)
        .with_speech(20, 6000)
        .with_silence(10)
        .with_speech(25, 6000)
        .with_silence(10);
    let engine = Arc::new(MeasuringEngine::new());

    let handle = pipeline
        .start(
            Box::new(source),
            engine.clone(),
            Box::new(CollectorSink::new()),
        )
        .unwrap();
    let text = handle.join().unwrap();

    let calls = engine.calls.lock().unwrap();
    assert_eq!(calls.len(), 2, "expected two dispatched utterances");
    // The second burst is longer, so its utterance must be too.
    assert!(calls[1] > calls[0]);
    assert_eq!(
        text,
        format!("len:{} len:{}", calls[0], calls[1]),
        "results must arrive in utterance order"
    );
}

#[test]
fn test_concurrent_dispatch_keeps_utterance_order() {
    /// Delays shrink as utterances grow, so later results finish first
    /// and ordering depends on the sequencer rather than on timing.
    struct ShrinkingDelayEngine;

    impl RecognitionEngine for ShrinkingDelayEngine {
        fn transcribe(&self, samples: &[i16], _sample_rate: u32) -> Result<Transcription> {
            let frames = samples.len() / FRAME;
            let delay = 120u64.saturating_sub(frames as u64 * 2);
            thread::sleep(Duration::from_millis(delay));
            Ok(Transcription::plain(format!("f{}", frames)))
        }

        fn model_name(&self) -> &str {
            "shrinking"
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    let mut config = test_config();
    config.dispatcher = DispatcherConfig {
        policy: DispatchPolicy::Concurrent { workers: 3 },
        ..Default::default()
    };

    let pipeline = Pipeline::new(config);
    let source = MockAudioSource::new()
        .with_silence(5)
        .with_speech(10, 6000)
        .with_silence(10)
        .with_speech(20, 6000)
        .with_silence(10)
        .with_speech(30, 6000)
        .with_silence(10);
    let engine: Arc<dyn RecognitionEngine> = Arc::new(ShrinkingDelayEngine);

    let handle = pipeline
        .start(Box::new(source), engine, Box::new(CollectorSink::new()))
        .unwrap();
    let text = handle.join().unwrap();

    let frames: Vec<&str> = text.split(' ').collect();
    assert_eq!(frames.len(), 3);
    // Frame counts strictly increase, so ordered delivery means the
    // shortest utterance comes first even though it finished last.
    let counts: Vec<usize> = frames
        .iter()
        .map(|f| f.trim_start_matches('f').parse().unwrap())
        .collect();
    assert!(counts.windows(2).all(|w| w[0] < w[1]), "got {:?}", counts);
}

#[test]
fn test_short_blip_is_discarded() {
    let mut config = test_config();
    config.detector.hysteresis_frames = 1;
    config.segmenter.min_utterance_frames = 20;

    let pipeline = Pipeline::new(config);
    let source = MockAudioSource::new()
        .with_silence(5)
        .with_speech(3, 6000)
        .with_silence(15);
    let engine: Arc<dyn RecognitionEngine> =
        Arc::new(MockEngine::new("mock").with_response("noise"));

    let handle = pipeline
        .start(Box::new(source), engine, Box::new(CollectorSink::new()))
        .unwrap();
    assert_eq!(handle.join(), None);
}

#[test]
fn test_isolated_spike_never_starts_an_utterance() {
    // hysteresis 3: one loud frame in a silent stream stays silence.
    let pipeline = Pipeline::new(test_config());
    let source = MockAudioSource::new()
        .with_silence(10)
        .with_speech(1, 20000)
        .with_silence(20);
    let engine = Arc::new(MeasuringEngine::new());

    let handle = pipeline
        .start(
            Box::new(source),
            engine.clone(),
            Box::new(CollectorSink::new()),
        )
        .unwrap();
    assert_eq!(handle.join(), None);
    assert!(engine.calls.lock().unwrap().is_empty());
}

#[test]
fn test_long_speech_is_force_finalized_in_windows() {
    let mut config = test_config();
    config.detector.hysteresis_frames = 1;
    config.segmenter.max_utterance_frames = 40;

    let pipeline = Pipeline::new(config);
    let source = MockAudioSource::new()
        .with_silence(5)
        .with_speech(90, 6000)
        .with_silence(10);
    let engine = Arc::new(MeasuringEngine::new());

    let handle = pipeline
        .start(
            Box::new(source),
            engine.clone(),
            Box::new(CollectorSink::new()),
        )
        .unwrap();
    handle.join();

    let calls = engine.calls.lock().unwrap();
    assert!(
        calls.len() >= 3,
        "90 speech frames with a 40-frame window should split, got {:?}",
        calls
    );
    for len in calls.iter().take(calls.len() - 1) {
        assert_eq!(*len, 40 * FRAME, "forced windows are full length");
    }
}

#[test]
fn test_events_report_the_session() {
    let (tx, rx) = crossbeam_channel::bounded(128);
    let mut config = test_config();
    config.event_tx = Some(tx);

    let pipeline = Pipeline::new(config);
    let source = MockAudioSource::new()
        .with_silence(5)
        .with_speech(20, 6000)
        .with_silence(10);
    let engine: Arc<dyn RecognitionEngine> = Arc::new(MockEngine::new("mock").with_response("hi"));

    let handle = pipeline
        .start(Box::new(source), engine, Box::new(CollectorSink::new()))
        .unwrap();
    handle.join();

    let events: Vec<PipelineEvent> = rx.try_iter().collect();
    let started = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::SpeechStarted { .. }));
    let finalized = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::UtteranceFinalized { .. }));
    let recognized = events
        .iter()
        .position(|e| matches!(e, PipelineEvent::Recognized { .. }));

    assert!(started.is_some());
    assert!(finalized.is_some());
    assert!(recognized.is_some());
    assert!(started < finalized && finalized < recognized);
    assert_eq!(events.last(), Some(&PipelineEvent::Stopped));
}

#[test]
fn test_stop_mid_stream_is_clean() {
    // A live (non-finite) source would keep the pipeline open; here the
    // source drains but stop() must still work on an already-idle handle.
    let pipeline = Pipeline::new(test_config());
    let source = MockAudioSource::new()
        .with_silence(5)
        .with_speech(20, 6000)
        .with_silence(10);
    let engine: Arc<dyn RecognitionEngine> =
        Arc::new(MockEngine::new("mock").with_response("done"));

    let handle = pipeline
        .start(Box::new(source), engine, Box::new(CollectorSink::new()))
        .unwrap();
    thread::sleep(Duration::from_millis(200));
    assert_eq!(handle.stop(), Some("done".to_string()));
}
