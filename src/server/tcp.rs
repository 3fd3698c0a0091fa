//! TCP Server
//!
//! Accepts connections and answers line-protocol requests, one task per
//! connection.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::protocol;
use crate::cache::ShardedCache;

/// Longest request line accepted; anything larger closes the connection.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

/// Serves the line protocol on `listener` until `shutdown` resolves.
///
/// # Arguments
/// * `listener` - Bound listener to accept from
/// * `cache` - Shared cache every connection operates on
/// * `shutdown` - Future that ends the accept loop when it completes
pub async fn serve<F>(
    listener: TcpListener,
    cache: Arc<ShardedCache<String, String>>,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    info!("Cache server listening on {}", listener.local_addr()?);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    let cache = cache.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, cache).await {
                            debug!("Connection {} closed with error: {}", peer, e);
                        }
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            },
        }
    }

    info!("Cache server stopped accepting connections");
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    cache: Arc<ShardedCache<String, String>>,
) -> io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            break;
        }
        if buf.last() != Some(&b'\n') && buf.len() > MAX_LINE_LEN {
            warn!("Request exceeds {} bytes, closing connection", MAX_LINE_LEN);
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let response = protocol::execute(&cache, &line);
        writer.write_all(format!("{response}\n").as_bytes()).await?;
    }

    writer.shutdown().await
}
