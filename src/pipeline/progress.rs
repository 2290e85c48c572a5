// src/pipeline/progress.rs

//! Progress sinks.
//!
//! Stages emit [`ProgressEvent`]s; what happens to them is up to the sink.
//! The CLI logs them, a UI layer can take them from a channel.

use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::models::{Level, ProgressEvent};

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        let position = match (event.current, event.total) {
            (Some(current), Some(total)) => format!(" ({current}/{total})"),
            _ => String::new(),
        };
        let phase = event.phase;
        match event.level {
            Level::Error => log::error!("[{}] {}{}", phase, event.message, position),
            Level::Warning => log::warn!("[{}] {}{}", phase, event.message, position),
            Level::Info | Level::Success => log::info!("[{}] {}{}", phase, event.message, position),
        }
    }
}

/// Forwards events into a channel; dropped receivers are ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        if let Err(e) = self.tx.send(event) {
            log::debug!("Progress receiver closed; dropped event: {}", e.0.message);
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Counters, Phase};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelSink::new(tx);

        sink.emit(ProgressEvent::new(Phase::Books, "Creating book", Counters::default()).at(1, 3));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.phase, Phase::Books);
        assert_eq!(event.percent(), Some(33));
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        sink.emit(ProgressEvent::new(Phase::Pages, "x", Counters::default()));
        sink.emit(ProgressEvent::new(Phase::Pages, "y", Counters::default()));
        assert!(sink.tx.is_closed());
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingSink::new();
        sink.emit(ProgressEvent::new(Phase::Analyze, "a", Counters::default()));
        sink.emit(ProgressEvent::new(Phase::Pages, "b", Counters::default()));
        assert_eq!(sink.events().len(), 2);
    }
}
