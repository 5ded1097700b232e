//! Banner decoy: greet like a real service, capture whatever comes back

use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::log::Role;
use crate::supervisor::ConnectionContext;

use super::read_chunk;

const MAX_REPLY: usize = 2048;
// Scanners often sit on the banner for a while before answering
const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn handle(mut stream: TcpStream, ctx: &ConnectionContext, banner: &[u8]) -> io::Result<()> {
    // Greeting goes out before the peer sends anything, like a real
    // SSH/Telnet daemon would.
    match stream.write_all(banner).await {
        Ok(()) => ctx.record(Role::Server, banner),
        Err(e) => debug!("Banner write failed: {}", e),
    }

    let data = read_chunk(&mut stream, MAX_REPLY, Some(READ_TIMEOUT)).await?;
    if !data.is_empty() {
        ctx.record(Role::Client, &data);
    }

    // No further response; the point was the greeting and the capture.
    let _ = stream.shutdown().await;
    Ok(())
}
