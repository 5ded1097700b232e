//! Protocol handlers module

pub mod banner;
pub mod generic;
pub mod http;

use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::{decode_escapes, HandlerConfig};
use crate::supervisor::ConnectionContext;

/// Runtime behavior for one listener, resolved once at startup. Dispatch
/// is a single match; no per-connection handler selection happens.
#[derive(Debug, Clone)]
pub enum HandlerKind {
    Http,
    Banner { banner: Vec<u8> },
    Generic { echo: bool },
}

impl HandlerKind {
    pub fn from_config(config: &HandlerConfig) -> Self {
        match config {
            HandlerConfig::Http => HandlerKind::Http,
            HandlerConfig::Banner { banner } => HandlerKind::Banner {
                banner: decode_escapes(banner),
            },
            HandlerConfig::Generic { echo, .. } => HandlerKind::Generic { echo: *echo },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HandlerKind::Http => "http",
            HandlerKind::Banner { .. } => "banner",
            HandlerKind::Generic { .. } => "generic",
        }
    }
}

/// Run one connection through the matching handler. The stream is consumed;
/// every handler leaves it shut down on all exit paths.
pub async fn run(kind: &HandlerKind, stream: TcpStream, ctx: &ConnectionContext) -> io::Result<()> {
    match kind {
        HandlerKind::Http => http::handle(stream, ctx).await,
        HandlerKind::Banner { banner } => banner::handle(stream, ctx, banner).await,
        HandlerKind::Generic { echo } => generic::handle(stream, ctx, *echo).await,
    }
}

/// Read at most `max` bytes from the peer. A timeout is "no data", not an
/// error; the handler carries on with whatever it has. I/O errors are
/// returned for the caller to decide.
pub(crate) async fn read_chunk(
    stream: &mut TcpStream,
    max: usize,
    wait: Option<Duration>,
) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; max];
    let n = match wait {
        Some(wait) => match tokio::time::timeout(wait, stream.read(&mut buf)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!("Read timed out after {:?}, treating as no data", wait);
                0
            }
        },
        None => stream.read(&mut buf).await?,
    };
    buf.truncate(n);
    Ok(buf)
}
