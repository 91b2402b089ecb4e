//! Chunked resumable upload protocol
//!
//! Content is read in fixed-size chunks; short reads loop until the chunk
//! fills or the stream ends. Each chunk is PUT at the byte offset the
//! server last acknowledged, carrying the session id once one has been
//! issued. The server's acknowledged offset is authoritative: the client
//! advances by exactly that much and retries the remainder, never assuming
//! full acceptance. After the last byte, a commit call binds the session
//! to the destination path and returns the final metadata.
//!
//! Cancellation is checked before every PUT; a cancelled upload abandons
//! the session (no abort call - it expires server-side) and leaves the
//! tree untouched because the caller only mutates it after the commit.

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use unidrive_core::provider::{ContentStream, ProgressFn};
use unidrive_core::StorageError;

use crate::api::EntryMetadata;
use crate::client::DropboxClient;

fn report(progress: Option<&ProgressFn>, total: Option<u64>, uploaded: u64) {
    if let (Some(report), Some(total)) = (progress, total) {
        if total > 0 {
            let pct = (uploaded.saturating_mul(100) / total).min(100) as u8;
            report(pct);
        }
    }
}

/// Streams `content` into a resumable upload session and commits it
pub(crate) async fn upload_chunked(
    client: &DropboxClient,
    dest_path: &str,
    mut content: ContentStream,
    cancel: &CancellationToken,
    progress: Option<&ProgressFn>,
    total: Option<u64>,
    chunk_size: usize,
) -> Result<EntryMetadata, StorageError> {
    report(progress, total, 0);

    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut upload_id: Option<String> = None;
    let mut offset: u64 = 0;

    loop {
        // Fill the chunk; short reads are looped until the buffer is full
        // or the stream ends.
        let mut filled = 0;
        while filled < buffer.len() {
            let read = content
                .read(&mut buffer[filled..])
                .await
                .map_err(|e| StorageError::Transport(anyhow::Error::new(e)))?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled == 0 {
            break;
        }

        // Push this chunk until the server has acknowledged all of it.
        // `acked` is how much of the chunk the server has accepted.
        let mut acked: usize = 0;
        while acked < filled {
            if cancel.is_cancelled() {
                debug!(offset, "upload cancelled, abandoning session");
                return Err(StorageError::Cancelled);
            }
            let slice = buffer[acked..filled].to_vec();
            let ack = client
                .put_chunk(slice, offset + acked as u64, upload_id.as_deref())
                .await?;

            acked = ack.offset.saturating_sub(offset).min(filled as u64) as usize;
            upload_id = Some(ack.upload_id);
            report(progress, total, offset + acked as u64);
        }

        offset += filled as u64;
    }

    info!(dest_path, bytes = offset, "committing upload session");
    client.commit_upload(dest_path, upload_id.as_deref()).await
}
