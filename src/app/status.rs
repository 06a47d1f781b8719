use crate::output::events::OutputEvent;

/// Receives lifecycle events relayed by the [`crate::Orchestrator`] for display.
pub trait StatusSink: Send {
    /// Handle one event, in emission order.
    fn on_event(&mut self, event: &OutputEvent);
}

impl<F> StatusSink for F
where
    F: FnMut(&OutputEvent) + Send,
{
    fn on_event(&mut self, event: &OutputEvent) {
        self(event)
    }
}

/// Logs every event through `tracing` and keeps the last status line.
#[derive(Clone, Debug, Default)]
pub struct LogStatusSink {
    last: Option<String>,
}

impl LogStatusSink {
    /// Sink with no status yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last status line.
    pub fn last_status(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

impl StatusSink for LogStatusSink {
    fn on_event(&mut self, event: &OutputEvent) {
        let text = event.status_text();
        match event {
            OutputEvent::SetupFailed { .. } => tracing::warn!(status = %text),
            OutputEvent::StreamingStopped { code, .. } if *code != 0 => {
                tracing::warn!(status = %text)
            }
            _ => tracing::info!(status = %text),
        }
        self.last = Some(text);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/app/status.rs"]
mod tests;
