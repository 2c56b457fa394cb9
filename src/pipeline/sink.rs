//! Text output handlers.

use crate::error::Result;
use crate::pipeline::types::TranscriptionResult;

/// Pluggable text output handler for the pipeline.
/// Pairs with AudioSource for input - this handles recognition output.
pub trait TextSink: Send + 'static {
    /// Handle one recognition result. Results arrive in utterance order.
    fn handle(&mut self, result: &TranscriptionResult) -> Result<()>;

    /// Called on pipeline shutdown. Return accumulated text if applicable.
    fn finish(&mut self) -> Option<String> {
        None
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Collects recognized text for batch mode and library use.
/// Returns accumulated text on finish().
pub struct CollectorSink {
    collected: Vec<String>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self {
            collected: Vec::new(),
        }
    }

    /// Snapshot of the collected lines so far.
    pub fn lines(&self) -> &[String] {
        &self.collected
    }
}

impl Default for CollectorSink {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSink for CollectorSink {
    fn handle(&mut self, result: &TranscriptionResult) -> Result<()> {
        self.collected.push(result.text.clone());
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        if self.collected.is_empty() {
            None
        } else {
            Some(self.collected.join(" "))
        }
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Pipe mode sink — writes recognized text to stdout, one line per
/// utterance.
pub struct StdoutSink;

impl TextSink for StdoutSink {
    fn handle(&mut self, result: &TranscriptionResult) -> Result<()> {
        println!("{}", result.text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(seq: u64, text: &str) -> TranscriptionResult {
        TranscriptionResult {
            utterance_seq: seq,
            text: text.to_string(),
            confidence: None,
            language: None,
        }
    }

    #[test]
    fn text_sink_is_object_safe() {
        let _sink: Box<dyn TextSink> = Box::new(CollectorSink::new());
    }

    #[test]
    fn collector_sink_collects_and_joins_text() {
        let mut sink = CollectorSink::new();

        sink.handle(&result(0, "Hello")).unwrap();
        sink.handle(&result(1, "world")).unwrap();
        sink.handle(&result(2, "Rust")).unwrap();

        assert_eq!(sink.finish(), Some("Hello world Rust".to_string()));
    }

    #[test]
    fn collector_sink_empty_returns_none() {
        let mut sink = CollectorSink::new();
        assert_eq!(sink.finish(), None);
    }

    #[test]
    fn collector_sink_single_item() {
        let mut sink = CollectorSink::new();
        sink.handle(&result(0, "Single")).unwrap();
        assert_eq!(sink.finish(), Some("Single".to_string()));
    }

    #[test]
    fn collector_sink_exposes_lines() {
        let mut sink = CollectorSink::new();
        sink.handle(&result(0, "a")).unwrap();
        sink.handle(&result(1, "b")).unwrap();
        assert_eq!(sink.lines(), ["a", "b"]);
    }

    #[test]
    fn collector_sink_name() {
        assert_eq!(CollectorSink::new().name(), "collector");
    }

    #[test]
    fn stdout_sink_name() {
        assert_eq!(StdoutSink.name(), "stdout");
    }
}
