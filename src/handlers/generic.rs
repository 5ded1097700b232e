//! Raw TCP capture with optional echo
//!
//! Keeps reading until the peer goes away. There is no read deadline: a
//! slow peer only ties up its own task, never the accept loop.

use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::log::Role;
use crate::supervisor::ConnectionContext;

use super::read_chunk;

const MAX_CHUNK: usize = 4096;

pub async fn handle(mut stream: TcpStream, ctx: &ConnectionContext, echo: bool) -> io::Result<()> {
    loop {
        let data = match read_chunk(&mut stream, MAX_CHUNK, None).await {
            // Zero-length read: peer closed cleanly
            Ok(data) if data.is_empty() => break,
            Ok(data) => data,
            Err(e) => {
                debug!("Read failed, ending capture: {}", e);
                break;
            }
        };

        ctx.record(Role::Client, &data);

        if echo {
            if let Err(e) = stream.write_all(&data).await {
                debug!("Echo write failed: {}", e);
                break;
            }
            ctx.record(Role::Server, &data);
        }
    }

    let _ = stream.shutdown().await;
    Ok(())
}
