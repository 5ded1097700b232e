//! Interaction records and log sinks

mod writer;

pub use writer::start_writer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::DecoyError;
use crate::supervisor::ConnectionContext;

/// File name under the configured log directory
pub const LOG_FILE: &str = "interactions.jsonl";

/// Which side of the conversation produced the bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}

/// One logical I/O event on a connection. Every byte read from or written
/// to a peer socket ends up in exactly one of these.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub ts: DateTime<Utc>,
    pub role: Role,
    pub peer: Option<String>,
    pub peer_port: Option<u16>,
    pub service: String,
    pub raw_hex: String,
    /// Best-effort UTF-8 decode, invalid sequences replaced
    pub raw_text: Option<String>,
}

/// Emitted when a protocol handler fails in a way it did not handle itself
#[derive(Debug, Clone, Serialize)]
pub struct HandlerFailure {
    pub ts: DateTime<Utc>,
    pub event: &'static str,
    pub port: u16,
    pub handler: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LogEvent {
    Interaction(InteractionRecord),
    Failure(HandlerFailure),
}

/// Destination for finished log events. May be invoked from the writer
/// task at any time; one event per call, appends must not interleave.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn append(&self, event: &LogEvent) -> anyhow::Result<()>;
}

/// Append-only JSON-lines file sink. One event per line, newline
/// terminated; the file is never truncated.
pub struct JsonlSink {
    file: File,
    path: PathBuf,
}

impl JsonlSink {
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self, DecoyError> {
        let dir = log_dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| DecoyError::Sink {
            path: dir.display().to_string(),
            source: e,
        })?;

        let path = dir.join(LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| DecoyError::Sink {
                path: path.display().to_string(),
                source: e,
            })?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Sink for JsonlSink {
    async fn append(&self, event: &LogEvent) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        (&self.file).write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Sink that hands every event to a callback, for embedders and tests that
/// want records in-process instead of on disk
pub struct CallbackSink<F>(F);

impl<F> CallbackSink<F>
where
    F: Fn(LogEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

#[async_trait]
impl<F> Sink for CallbackSink<F>
where
    F: Fn(LogEvent) + Send + Sync,
{
    async fn append(&self, event: &LogEvent) -> anyhow::Result<()> {
        (self.0)(event.clone());
        Ok(())
    }
}

/// Handle used by connection tasks to submit events. Submission never
/// fails into the network path; a vanished writer is a debug-level note.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::UnboundedSender<LogEvent>,
}

impl Recorder {
    pub fn record(&self, ctx: &ConnectionContext, role: Role, bytes: &[u8]) {
        let record = InteractionRecord {
            ts: Utc::now(),
            role,
            peer: ctx.peer_addr.clone(),
            peer_port: ctx.peer_port,
            service: ctx.service.clone(),
            raw_hex: hex::encode(bytes),
            raw_text: Some(String::from_utf8_lossy(bytes).into_owned()),
        };
        self.submit(LogEvent::Interaction(record));
    }

    pub fn record_failure(&self, port: u16, handler: &'static str, error: String) {
        let failure = HandlerFailure {
            ts: Utc::now(),
            event: "handler_exception",
            port,
            handler,
            error,
        };
        self.submit(LogEvent::Failure(failure));
    }

    fn submit(&self, event: LogEvent) {
        if self.tx.send(event).is_err() {
            debug!("log writer gone, dropping event");
        }
    }
}
