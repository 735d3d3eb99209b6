//! Cross-cutting run state: the cooperative stop token and the operator log.

use crate::core::error::HarvestResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

/// Cooperative cancellation token shared between the host and the run.
///
/// The run polls it at page and job boundaries only; it never interrupts an
/// in-flight page interaction.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    stop: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Operator-facing log stream.
///
/// Every line goes to `tracing` and, when the host attached one, to an
/// append-only channel it can render however it likes.
#[derive(Clone, Debug, Default)]
pub struct RunLog {
    sink: Option<UnboundedSender<String>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: UnboundedSender<String>) -> Self {
        Self { sink: Some(sink) }
    }

    pub fn info(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{}", line);
        self.forward(line);
    }

    pub fn warn(&self, line: impl Into<String>) {
        let line = line.into();
        warn!("{}", line);
        self.forward(line);
    }

    pub fn error(&self, line: impl Into<String>) {
        let line = line.into();
        error!("{}", line);
        self.forward(line);
    }

    /// Propagate fatal errors; log anything else as a warning and yield `None`.
    pub fn contain<T>(&self, result: HarvestResult<T>, what: &str) -> HarvestResult<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.warn(format!("  {what}: {e}"));
                Ok(None)
            }
        }
    }

    fn forward(&self, line: String) {
        if let Some(sink) = &self.sink {
            // Receiver gone means the host stopped listening; tracing still has the line.
            let _ = sink.send(line);
        }
    }
}
