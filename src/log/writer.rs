//! Background writer that drains queued events into the sink
//!
//! Connection tasks submit events to a channel; a single task appends them
//! in arrival order, so concurrent connections cannot interleave partial
//! lines and records from one connection keep their I/O order.

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::{LogEvent, Recorder, Sink};

/// Start the writer task and hand back the submission handle
pub fn start_writer(sink: Box<dyn Sink>) -> Recorder {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(writer_task(sink, rx));

    Recorder { tx }
}

async fn writer_task(sink: Box<dyn Sink>, mut rx: mpsc::UnboundedReceiver<LogEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(e) = sink.append(&event).await {
            // The event is lost; connection handling must not stall on it
            error!("Failed to append log event: {}", e);
        }
    }
    debug!("Log writer shutting down");
}
