//! Per-connection orchestration
//!
//! Builds the connection context, runs the selected handler, and turns
//! any failure into a logged event instead of letting it reach the accept
//! loop. The socket is owned by the handler future and dropped on every
//! path, so closure is guaranteed.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

use crate::handlers::{self, HandlerKind};
use crate::log::{Recorder, Role};

/// Everything a handler knows about one connection. Created fresh on
/// accept, owned by that connection's task, never shared with another.
pub struct ConnectionContext {
    pub peer_addr: Option<String>,
    pub peer_port: Option<u16>,
    pub service: String,
    recorder: Recorder,
}

impl ConnectionContext {
    pub fn new(
        peer_addr: Option<String>,
        peer_port: Option<u16>,
        service: String,
        recorder: Recorder,
    ) -> Self {
        Self {
            peer_addr,
            peer_port,
            service,
            recorder,
        }
    }

    pub fn record(&self, role: Role, bytes: &[u8]) {
        self.recorder.record(self, role, bytes);
    }
}

/// Entry point for every accepted connection
pub async fn handle_connection(
    stream: TcpStream,
    kind: Arc<HandlerKind>,
    service: String,
    port: u16,
    recorder: Recorder,
) {
    // Absent peer info is represented as None, not treated as a failure
    let peer = stream.peer_addr().ok();
    let ctx = ConnectionContext::new(
        peer.map(|p| p.ip().to_string()),
        peer.map(|p| p.port()),
        service,
        recorder.clone(),
    );

    debug!(
        "Connection on port {} from {} (handler={})",
        port,
        ctx.peer_addr.as_deref().unwrap_or("unknown"),
        kind.label()
    );

    let outcome = AssertUnwindSafe(handlers::run(&kind, stream, &ctx))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            debug!("Connection on port {} finished", port);
        }
        Ok(Err(e)) => {
            // Unexpected fault, as opposed to a timeout the handler already
            // absorbed. The listener keeps accepting either way.
            debug!("Handler {} failed on port {}: {}", kind.label(), port, e);
            recorder.record_failure(port, kind.label(), e.to_string());
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            debug!(
                "Handler {} panicked on port {}: {}",
                kind.label(),
                port,
                message
            );
            recorder.record_failure(port, kind.label(), message);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
