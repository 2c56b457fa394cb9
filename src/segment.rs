//! Utterance segmentation.
//!
//! Groups labeled frames into utterances: a pre-roll ring preserves the
//! silence just before speech onset, a trailing silence run finalizes the
//! utterance, and duration bounds discard noise blips and cap runaway
//! segments.

use std::collections::VecDeque;
use std::time::Instant;

use crate::defaults;
use crate::pipeline::types::{AudioFrame, LabeledFrame, Utterance};

/// Configuration for the segmenter, in whole frames.
///
/// All thresholds are frame counts rather than wall-clock durations, so
/// segmentation is a pure function of the frame stream.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// Frame duration in milliseconds, used for reporting only.
    pub frame_ms: u32,
    /// Silence frames kept before speech onset.
    pub pre_roll_frames: u32,
    /// Trailing silence frames kept on a finalized utterance.
    pub trail_pad_frames: u32,
    /// Consecutive silence frames that finalize an utterance.
    pub finalize_silence_frames: u32,
    /// Minimum utterance length in frames; shorter segments are discarded.
    pub min_utterance_frames: u32,
    /// Maximum utterance length in frames; reaching it forces finalization.
    pub max_utterance_frames: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            frame_ms: defaults::FRAME_MS,
            pre_roll_frames: defaults::PRE_ROLL_MS / defaults::FRAME_MS,
            trail_pad_frames: defaults::TRAIL_PAD_MS / defaults::FRAME_MS,
            finalize_silence_frames: defaults::MAX_SILENCE_MS / defaults::FRAME_MS,
            min_utterance_frames: defaults::MIN_UTTERANCE_MS / defaults::FRAME_MS,
            max_utterance_frames: defaults::MAX_UTTERANCE_MS / defaults::FRAME_MS,
        }
    }
}

/// Outcome of feeding one frame to the segmenter.
#[derive(Debug)]
pub enum SegmentOutput {
    /// Nothing to report.
    None,
    /// Speech onset confirmed; accumulation started at this frame.
    SpeechStarted { frame_sequence: u64 },
    /// An utterance was finalized.
    Finalized(Utterance),
    /// An accumulating segment ended below the minimum duration.
    Discarded { duration_ms: u32 },
}

#[derive(Debug)]
enum State {
    /// Waiting for speech; recent silence is kept in the pre-roll ring.
    Idle,
    /// Building an utterance.
    Accumulating {
        frames: Vec<AudioFrame>,
        trailing_silence: u32,
        speech_frames: u32,
    },
}

/// Frame-driven utterance state machine.
#[derive(Debug)]
pub struct Segmenter {
    config: SegmenterConfig,
    state: State,
    ring: VecDeque<AudioFrame>,
    next_seq: u64,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            state: State::Idle,
            ring: VecDeque::with_capacity(config.pre_roll_frames as usize),
            next_seq: 0,
        }
    }

    /// Feeds one labeled frame and returns what, if anything, happened.
    pub fn push(&mut self, labeled: LabeledFrame) -> SegmentOutput {
        match &mut self.state {
            State::Idle => {
                if labeled.is_speech {
                    let sequence = labeled.frame.sequence;
                    let mut frames: Vec<AudioFrame> = self.ring.drain(..).collect();
                    let speech_frames = 1;
                    frames.push(labeled.frame);
                    self.state = State::Accumulating {
                        frames,
                        trailing_silence: 0,
                        speech_frames,
                    };
                    SegmentOutput::SpeechStarted {
                        frame_sequence: sequence,
                    }
                } else {
                    self.push_ring(labeled.frame);
                    SegmentOutput::None
                }
            }
            State::Accumulating {
                frames,
                trailing_silence,
                speech_frames,
            } => {
                frames.push(labeled.frame);
                if labeled.is_speech {
                    *trailing_silence = 0;
                    *speech_frames += 1;
                } else {
                    *trailing_silence += 1;
                }

                if *trailing_silence >= self.config.finalize_silence_frames {
                    self.finalize_on_silence()
                } else if frames.len() >= self.config.max_utterance_frames as usize {
                    self.finalize_forced()
                } else {
                    SegmentOutput::None
                }
            }
        }
    }

    /// Finalizes any partial accumulation, for use at shutdown.
    ///
    /// Trailing silence is trimmed to the trail pad just as on a normal
    /// finalization; a segment below the minimum duration is discarded.
    pub fn flush(&mut self) -> SegmentOutput {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => SegmentOutput::None,
            State::Accumulating {
                frames,
                trailing_silence,
                speech_frames,
            } => self.build(frames, trailing_silence, speech_frames),
        }
    }

    /// Returns true while an utterance is accumulating.
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, State::Accumulating { .. })
    }

    fn push_ring(&mut self, frame: AudioFrame) {
        if self.config.pre_roll_frames == 0 {
            return;
        }
        if self.ring.len() == self.config.pre_roll_frames as usize {
            self.ring.pop_front();
        }
        self.ring.push_back(frame);
    }

    fn finalize_on_silence(&mut self) -> SegmentOutput {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Accumulating {
                frames,
                trailing_silence,
                speech_frames,
            } => self.build(frames, trailing_silence, speech_frames),
            State::Idle => SegmentOutput::None,
        }
    }

    /// Forced finalization at the maximum length. The whole buffer is kept
    /// and accumulation restarts immediately with no pre-roll, so speech
    /// spanning the boundary loses no samples.
    fn finalize_forced(&mut self) -> SegmentOutput {
        match std::mem::replace(
            &mut self.state,
            State::Accumulating {
                frames: Vec::new(),
                trailing_silence: 0,
                speech_frames: 0,
            },
        ) {
            State::Accumulating {
                frames,
                trailing_silence,
                speech_frames,
            } => {
                if let State::Accumulating {
                    trailing_silence: carried,
                    ..
                } = &mut self.state
                {
                    // Carry the silence run so a pause spanning the forced
                    // boundary still finalizes the successor segment.
                    *carried = trailing_silence;
                }
                match self.assemble(frames, speech_frames) {
                    Some(utterance) => SegmentOutput::Finalized(utterance),
                    None => SegmentOutput::None,
                }
            }
            State::Idle => SegmentOutput::None,
        }
    }

    fn build(
        &mut self,
        mut frames: Vec<AudioFrame>,
        trailing_silence: u32,
        speech_frames: u32,
    ) -> SegmentOutput {
        let excess = trailing_silence.saturating_sub(self.config.trail_pad_frames) as usize;
        let keep = frames.len().saturating_sub(excess);
        let trimmed: Vec<AudioFrame> = frames.drain(keep..).collect();

        if (frames.len() as u32) < self.config.min_utterance_frames {
            let duration_ms = frames.len() as u32 * self.config.frame_ms;
            // The discarded tail was all silence; reseed the pre-roll ring
            // with it so an immediate restart keeps its lead padding.
            for frame in trimmed {
                self.push_ring(frame);
            }
            return SegmentOutput::Discarded { duration_ms };
        }

        for frame in trimmed {
            self.push_ring(frame);
        }

        match self.assemble(frames, speech_frames) {
            Some(utterance) => SegmentOutput::Finalized(utterance),
            None => SegmentOutput::None,
        }
    }

    fn assemble(&mut self, frames: Vec<AudioFrame>, speech_frames: u32) -> Option<Utterance> {
        let first = frames.first()?;
        let last = frames.last()?;
        let first_frame = first.sequence;
        let last_frame = last.sequence;
        let started_at = first.timestamp;
        let ended_at = last.timestamp;

        let mut samples = Vec::with_capacity(frames.iter().map(|f| f.samples.len()).sum());
        for frame in &frames {
            samples.extend_from_slice(&frame.samples);
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        Some(Utterance {
            samples,
            seq,
            first_frame,
            last_frame,
            started_at,
            ended_at,
            speech_frames,
        })
    }
}
