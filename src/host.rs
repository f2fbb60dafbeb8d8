//! Host channel: NDJSON messages between the coordinator and the extension
//! pages (content scripts, popup), one JSON object per line.

use crate::coordinator::CoordinatorHandle;
use crate::error::{Error, Result};
use crate::protocol::{Inbound, Outbound};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Forward host lines to the coordinator until EOF or a read error, then
/// ask it to stop. Lines that aren't valid UTF-8 are decoded lossily and
/// dropped like any other malformed message.
pub async fn pump_inbound<R>(mut reader: R, handle: CoordinatorHandle) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let result = forward_lines(&mut reader, &handle).await;
    match &result {
        Ok(()) => log::info!("[HOST] Input closed"),
        Err(e) => log::error!("[HOST] Input failed: {}", e),
    }
    // Coordinator may already be gone.
    let _ = handle.shutdown();
    result
}

async fn forward_lines<R>(reader: &mut R, handle: &CoordinatorHandle) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }

        let line = String::from_utf8_lossy(&buf);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Inbound>(trimmed) {
            Ok(msg) => handle.send(msg)?,
            Err(e) => log::warn!("[HOST] Dropping malformed message: {}", e),
        }
    }
}

/// Write coordinator output until every sender is dropped.
pub async fn pump_outbound<W>(mut rx: mpsc::UnboundedReceiver<Outbound>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let mut line = serde_json::to_string(&msg)
            .map_err(|e| Error::Protocol(format!("JSON serialize failed: {}", e)))?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
