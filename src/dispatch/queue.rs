//! Bounded utterance queue between the capture path and the workers.
//!
//! Unlike a plain bounded channel, a full queue drops its OLDEST entry to
//! make room for the newest utterance: recent speech is worth more than
//! stale speech the user has already moved past.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::pipeline::types::Utterance;

struct Inner {
    queue: VecDeque<Utterance>,
    closed: bool,
}

/// Bounded MPMC queue with drop-oldest overflow.
pub struct UtteranceQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    capacity: usize,
}

impl UtteranceQueue {
    /// Creates a queue holding at most `capacity` utterances.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Enqueues an utterance without blocking.
    ///
    /// If the queue is full the oldest entry is evicted and returned so the
    /// caller can report the drop. Pushing to a closed queue returns the
    /// utterance back.
    pub fn push(&self, utterance: Utterance) -> PushOutcome {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.closed {
            return PushOutcome::Closed(utterance);
        }
        let dropped = if inner.queue.len() == self.capacity {
            inner.queue.pop_front()
        } else {
            None
        };
        inner.queue.push_back(utterance);
        drop(inner);
        self.available.notify_one();
        match dropped {
            Some(old) => PushOutcome::Evicted(old),
            None => PushOutcome::Queued,
        }
    }

    /// Dequeues the next utterance, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Utterance> {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(utterance) = inner.queue.pop_front() {
                return Some(utterance);
            }
            if inner.closed {
                return None;
            }
            inner = match self.available.wait(inner) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Closes the queue. Queued entries remain poppable; waiting consumers
    /// wake and drain.
    pub fn close(&self) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    /// Current number of queued utterances.
    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.queue.len(),
            Err(poisoned) => poisoned.into_inner().queue.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a non-blocking push.
#[derive(Debug)]
pub enum PushOutcome {
    /// Accepted with room to spare.
    Queued,
    /// Accepted; the returned oldest entry was evicted to make room.
    Evicted(Utterance),
    /// The queue was already closed; the utterance is handed back.
    Closed(Utterance),
}
