//! Arrival-order result sequencing.
//!
//! Utterances may be recognized out of order when dispatch runs multiple
//! workers. The sequencer buffers results until every earlier utterance has
//! either produced a result or been marked skipped, so text always reaches
//! the sink in the order the utterances were spoken.

use std::collections::BTreeMap;

use crate::pipeline::types::TranscriptionResult;

/// Reorder buffer keyed by utterance sequence number.
///
/// `None` entries mark utterances that will never produce text (dropped by
/// backpressure, failed, or timed out); they release the results behind
/// them.
#[derive(Debug, Default)]
pub struct ResultSequencer {
    next_seq: u64,
    pending: BTreeMap<u64, Option<TranscriptionResult>>,
}

impl ResultSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submits a finished result and returns everything now emittable,
    /// in sequence order.
    pub fn submit(&mut self, result: TranscriptionResult) -> Vec<TranscriptionResult> {
        self.pending.insert(result.utterance_seq, Some(result));
        self.release()
    }

    /// Marks an utterance as never completing and returns any results it
    /// was holding back.
    pub fn mark_skipped(&mut self, seq: u64) -> Vec<TranscriptionResult> {
        self.pending.insert(seq, None);
        self.release()
    }

    /// Number of results and skip marks waiting on earlier utterances.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn release(&mut self) -> Vec<TranscriptionResult> {
        let mut ready = Vec::new();
        while let Some(entry) = self.pending.remove(&self.next_seq) {
            if let Some(result) = entry {
                ready.push(result);
            }
            self.next_seq += 1;
        }
        ready
    }
}
