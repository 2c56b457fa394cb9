//! Utterance dispatch: bounded queueing, recognition workers and ordered
//! result delivery.

pub mod dispatcher;
pub mod queue;
pub mod sequencer;

pub use dispatcher::{DispatchPolicy, Dispatcher, DispatcherConfig};
pub use queue::{PushOutcome, UtteranceQueue};
pub use sequencer::ResultSequencer;
