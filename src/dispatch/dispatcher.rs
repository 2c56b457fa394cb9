//! Utterance dispatch: workers pulling from the queue into the engine.
//!
//! Dispatch policy decides how many workers call the engine at once; the
//! sequencer guarantees the sink sees results in utterance order either
//! way.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::defaults;
use crate::dispatch::queue::{PushOutcome, UtteranceQueue};
use crate::dispatch::sequencer::ResultSequencer;
use crate::pipeline::sink::TextSink;
use crate::pipeline::types::{PipelineEvent, TranscriptionResult, Utterance};
use crate::stt::engine::{call_with_timeout, RecognitionEngine};

/// How utterances are fed to the recognition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// One worker; at most one engine call in flight. The default, and
    /// the right choice for engines that serialize internally anyway.
    Serial,
    /// Several workers calling the engine concurrently. Results are still
    /// emitted in utterance order.
    Concurrent { workers: usize },
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        DispatchPolicy::Serial
    }
}

impl DispatchPolicy {
    fn worker_count(&self) -> usize {
        match self {
            DispatchPolicy::Serial => 1,
            DispatchPolicy::Concurrent { workers } => (*workers).max(1),
        }
    }
}

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub policy: DispatchPolicy,
    /// Queue depth before drop-oldest kicks in.
    pub queue_capacity: usize,
    /// Per-call recognition deadline.
    pub timeout: Duration,
    /// Sample rate passed through to the engine.
    pub sample_rate: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            policy: DispatchPolicy::Serial,
            queue_capacity: defaults::QUEUE_CAPACITY,
            timeout: Duration::from_secs(defaults::RECOGNITION_TIMEOUT_SECS),
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// Sequencer and sink behind one lock, so releasing ordered results and
/// handing them to the sink is a single atomic step.
struct OrderedOutput {
    sequencer: ResultSequencer,
    sink: Box<dyn TextSink>,
}

impl OrderedOutput {
    fn deliver(&mut self, results: Vec<TranscriptionResult>) {
        for result in results {
            if result.text.trim().is_empty() {
                continue;
            }
            if let Err(e) = self.sink.handle(&result) {
                eprintln!("sotto: sink rejected utterance {}: {}", result.utterance_seq, e);
            }
        }
    }
}

/// Owns the utterance queue and the recognition workers.
pub struct Dispatcher {
    queue: Arc<UtteranceQueue>,
    output: Arc<Mutex<OrderedOutput>>,
    events: Option<Sender<PipelineEvent>>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawns the workers and returns a handle used to enqueue utterances.
    pub fn spawn(
        engine: Arc<dyn RecognitionEngine>,
        sink: Box<dyn TextSink>,
        config: DispatcherConfig,
        events: Option<Sender<PipelineEvent>>,
    ) -> Self {
        let queue = Arc::new(UtteranceQueue::new(config.queue_capacity));
        let output = Arc::new(Mutex::new(OrderedOutput {
            sequencer: ResultSequencer::new(),
            sink,
        }));

        let worker_count = config.policy.worker_count();
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let output = Arc::clone(&output);
            let engine = Arc::clone(&engine);
            let events = events.clone();
            let timeout = config.timeout;
            let sample_rate = config.sample_rate;
            let builder = thread::Builder::new().name(format!("sotto-dispatch-{}", worker_id));
            match builder.spawn(move || {
                while let Some(utterance) = queue.pop() {
                    recognize_one(
                        &engine,
                        &output,
                        &events,
                        utterance,
                        sample_rate,
                        timeout,
                    );
                }
            }) {
                Ok(handle) => workers.push(handle),
                Err(e) => eprintln!("sotto: failed to spawn dispatch worker: {}", e),
            }
        }

        Self {
            queue,
            output,
            events,
            workers,
        }
    }

    /// Hands an utterance to the workers without blocking.
    ///
    /// If the queue is full the oldest queued utterance is dropped: its
    /// sequence number is marked skipped so it never stalls ordering, and
    /// one `Backpressure` event is emitted.
    pub fn enqueue(&self, utterance: Utterance) {
        match self.queue.push(utterance) {
            PushOutcome::Queued => {}
            PushOutcome::Evicted(old) => {
                let mut guard = match self.output.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let released = guard.sequencer.mark_skipped(old.seq);
                guard.deliver(released);
                drop(guard);
                emit(&self.events, PipelineEvent::Backpressure { dropped_seq: old.seq });
            }
            // Shutting down; late utterances are dropped silently.
            PushOutcome::Closed(_) => {}
        }
    }

    /// Number of utterances currently queued.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Closes the queue, drains the workers, and finishes the sink.
    ///
    /// Returns whatever accumulated text the sink reports.
    pub fn shutdown(mut self) -> Option<String> {
        self.queue.close();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                eprintln!("sotto: dispatch worker panicked");
            }
        }
        match self.output.lock() {
            Ok(mut output) => output.sink.finish(),
            Err(poisoned) => poisoned.into_inner().sink.finish(),
        }
    }
}

fn recognize_one(
    engine: &Arc<dyn RecognitionEngine>,
    output: &Arc<Mutex<OrderedOutput>>,
    events: &Option<Sender<PipelineEvent>>,
    utterance: Utterance,
    sample_rate: u32,
    timeout: Duration,
) {
    let seq = utterance.seq;
    let outcome = call_with_timeout(
        Arc::clone(engine),
        utterance.samples,
        sample_rate,
        seq,
        timeout,
    );

    let mut guard = match output.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    match outcome {
        Ok(transcription) => {
            emit(
                events,
                PipelineEvent::Recognized {
                    seq,
                    chars: transcription.text.chars().count(),
                },
            );
            let released = guard.sequencer.submit(TranscriptionResult {
                utterance_seq: seq,
                text: transcription.text,
                confidence: transcription.confidence,
                language: transcription.language,
            });
            guard.deliver(released);
        }
        Err(e) => {
            eprintln!("sotto: {}", e);
            emit(events, PipelineEvent::RecognitionFailed { seq });
            let released = guard.sequencer.mark_skipped(seq);
            guard.deliver(released);
        }
    }
}

fn emit(events: &Option<Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = events {
        // Best effort: a full or disconnected subscriber never blocks
        // dispatch.
        let _ = tx.try_send(event);
    }
}
