//! HTTP decoy: swallow one request chunk, answer with a static page
//!
//! The request is captured verbatim and never parsed; garbage bytes get
//! the same page as a well-formed GET.

use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::log::Role;
use crate::supervisor::ConnectionContext;

use super::read_chunk;

const MAX_REQUEST: usize = 4096;
const READ_TIMEOUT: Duration = Duration::from_secs(3);

const PAGE: &str = "<html><body><h1>Welcome</h1><p>It works.</p></body></html>";

pub async fn handle(mut stream: TcpStream, ctx: &ConnectionContext) -> io::Result<()> {
    // One chunk, no reassembly. An empty read just means the scanner
    // connected without sending anything.
    let data = read_chunk(&mut stream, MAX_REQUEST, Some(READ_TIMEOUT)).await?;
    if !data.is_empty() {
        ctx.record(Role::Client, &data);
    }

    let response = build_response(PAGE);
    match stream.write_all(&response).await {
        Ok(()) => ctx.record(Role::Server, &response),
        Err(e) => debug!("HTTP response write failed: {}", e),
    }

    let _ = stream.shutdown().await;
    Ok(())
}

/// Minimal well-formed HTTP/1.1 response with an exact Content-Length
fn build_response(body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
    .into_bytes()
}
