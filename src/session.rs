//! Per-connection session worker.
//!
//! Each accepted connection gets one tokio task running the read loop:
//! bytes are fed through the session's own accumulator, every completed line
//! is appended to the shared log, and the full log contents are written back
//! after each line. A `SEEKTO:<index>,<offset>` line (when enabled) is a
//! directive rather than data: the dump it triggers starts at the resolved
//! byte offset and nothing is appended.
//!
//! Failures here are contained: a transport error or disconnect closes this
//! session only. The worker flags itself completed just before returning so
//! the supervisor's next reap pass can join it.

use crate::error::{LogError, Result};
use crate::ring::Entry;
use crate::server::ServerContext;
use regex::Regex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

const READ_CHUNK: usize = 4096;

/// Entry point for a spawned session task.
pub async fn run(
    ctx: Arc<ServerContext>,
    stream: TcpStream,
    peer: SocketAddr,
    completed: Arc<AtomicBool>,
    shutdown_rx: broadcast::Receiver<()>,
) {
    match serve(&ctx, stream, shutdown_rx).await {
        Ok(()) => tracing::info!(%peer, "closed connection"),
        Err(error) => tracing::warn!(%peer, %error, "session ended with error"),
    }
    completed.store(true, Ordering::SeqCst);
}

/// Read loop over any byte stream. Returns when the peer signals end of
/// stream or the supervisor broadcasts shutdown; read errors surface as
/// `Transport`. Shutdown is only observed between reads, never mid-dump.
pub async fn serve<S>(
    ctx: &ServerContext,
    stream: S,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut accumulator = crate::accumulator::WriteAccumulator::new(ctx.config.max_line_bytes);
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = tokio::select! {
            result = reader.read(&mut buf) => result.map_err(LogError::Transport)?,
            _ = shutdown_rx.recv() => return Ok(()),
        };
        if n == 0 {
            return Ok(());
        }
        for completion in accumulator.feed(&buf[..n]) {
            match completion {
                Ok(entry) => {
                    // A failed append or dump abandons that line only; the
                    // session keeps reading.
                    if let Err(error) = handle_line(ctx, &mut writer, entry).await {
                        tracing::warn!(%error, "line abandoned");
                    }
                }
                Err(error) => tracing::warn!(%error, "line dropped"),
            }
        }
    }
}

async fn handle_line<W>(ctx: &ServerContext, writer: &mut W, entry: Entry) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if ctx.config.enable_seek {
        if let Some((index, offset)) = parse_seek_directive(entry.as_bytes()) {
            let position = ctx.device.seek_to(index, offset).await?;
            let dump = ctx.device.snapshot_from(position as usize).await;
            writer.write_all(&dump).await.map_err(LogError::Transport)?;
            return Ok(());
        }
    }
    let dump = ctx.device.append_and_snapshot(entry, 0).await?;
    writer.write_all(&dump).await.map_err(LogError::Transport)?;
    Ok(())
}

/// Parses a `SEEKTO:<index>,<offset>` directive line.
fn parse_seek_directive(line: &[u8]) -> Option<(usize, usize)> {
    static SEEK_RE: OnceLock<Regex> = OnceLock::new();
    let re = SEEK_RE.get_or_init(|| {
        Regex::new(r"^SEEKTO:(\d+),(\d+)\n$").expect("seek directive pattern is valid")
    });
    let text = std::str::from_utf8(line).ok()?;
    let caps = re.captures(text)?;
    let index = caps[1].parse().ok()?;
    let offset = caps[2].parse().ok()?;
    Some((index, offset))
}
