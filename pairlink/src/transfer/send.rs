//! Send pipeline methods for [`TransferEngine`].
//!
//! Contains chat sends and the chunked file send loop with buffered-amount
//! backpressure.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt};

use pairlink_proto::frame::{ControlFrame, chunk_count};

use crate::channel::DataChannel;

use super::{SendSummary, TransferEngine, TransferError};

/// Holds the engine's in-flight flag for the lifetime of one file send.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, TransferError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TransferError::TransferInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C: DataChannel> TransferEngine<C> {
    /// Send one chat message.
    ///
    /// Chat ignores backpressure and may be sent while a file is in
    /// flight; it lands between chunks in channel order.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if encoding or the channel send fails.
    pub async fn send_chat(&self, text: &str) -> Result<(), TransferError> {
        self.send_control(&ControlFrame::Chat {
            text: text.to_string(),
        })
        .await
    }

    /// Send a file of `size` bytes read from `reader`.
    ///
    /// Emits `file-meta`, then `ceil(size / chunk_size)` binary frames, then
    /// `file-end`. Before each chunk the sender parks on the channel's drain
    /// notification if the buffered amount has reached the high-water mark.
    ///
    /// If the source fails or runs short, a `file-abort` is sent so the
    /// receiver drops its partial buffer, and the channel stays open.
    ///
    /// # Errors
    ///
    /// - [`TransferError::TransferInProgress`] if a file send is already
    ///   running on this engine.
    /// - [`TransferError::Read`] / [`TransferError::ShortRead`] if the
    ///   source fails.
    /// - [`TransferError::Channel`] if the channel closes or fails.
    pub async fn send_file<R>(
        &self,
        name: &str,
        size: u64,
        reader: R,
    ) -> Result<SendSummary, TransferError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let _in_flight = InFlight::acquire(&self.sending)?;

        tracing::info!(
            file = %name,
            size,
            chunks = chunk_count(size, self.config.chunk_size as u64),
            "sending file"
        );
        self.send_control(&ControlFrame::FileMeta {
            name: name.to_string(),
            size,
        })
        .await?;

        let chunks = match self.stream_chunks(size, reader).await {
            Ok(chunks) => chunks,
            Err(e) => {
                if !matches!(e, TransferError::Channel(_)) {
                    let abort = ControlFrame::FileAbort {
                        reason: e.to_string(),
                    };
                    if let Err(abort_err) = self.send_control(&abort).await {
                        tracing::warn!(error = %abort_err, "failed to send file-abort");
                    }
                }
                tracing::warn!(file = %name, error = %e, "file send aborted");
                return Err(e);
            }
        };

        self.send_control(&ControlFrame::FileEnd).await?;
        tracing::info!(file = %name, size, chunks, "file sent");

        Ok(SendSummary {
            name: name.to_string(),
            bytes: size,
            chunks,
        })
    }

    /// Send an in-memory buffer as a file.
    ///
    /// # Errors
    ///
    /// See [`send_file`](Self::send_file).
    pub async fn send_bytes(&self, name: &str, data: &[u8]) -> Result<SendSummary, TransferError> {
        self.send_file(name, data.len() as u64, data).await
    }

    /// Send a file from disk, named by its final path component.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Read`] if the file cannot be opened, plus
    /// everything [`send_file`](Self::send_file) returns.
    pub async fn send_path(&self, path: &Path) -> Result<SendSummary, TransferError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::NoFileName(path.display().to_string()))?;
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        self.send_file(&name, size, file).await
    }

    /// Read and send the body of a file. Returns the number of chunks sent.
    async fn stream_chunks<R>(&self, size: u64, mut reader: R) -> Result<u64, TransferError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let chunk_size = self.config.chunk_size;
        let mut buf = vec![0u8; chunk_size];
        let mut sent: u64 = 0;
        let mut chunks: u64 = 0;

        while sent < size {
            let remaining = size - sent;
            let want = usize::try_from(remaining).map_or(chunk_size, |r| r.min(chunk_size));

            self.wait_for_capacity().await?;

            let filled = fill_chunk(&mut reader, &mut buf[..want]).await?;
            if filled < want {
                return Err(TransferError::ShortRead {
                    read: sent + filled as u64,
                    expected: size,
                });
            }

            self.channel.send_binary(&buf[..want]).await?;
            sent += want as u64;
            chunks += 1;
            tracing::trace!(sent, size, "chunk sent");
        }

        debug_assert_eq!(chunks, chunk_count(size, chunk_size as u64));
        Ok(chunks)
    }

    /// Park until the channel drains below the high-water mark.
    async fn wait_for_capacity(&self) -> Result<(), TransferError> {
        let high_water_mark = self.config.high_water_mark;
        let buffered = self.channel.buffered_amount();
        if buffered >= high_water_mark {
            tracing::debug!(buffered, high_water_mark, "channel saturated, pausing");
            self.channel.wait_drained(high_water_mark).await?;
        }
        Ok(())
    }

    async fn send_control(&self, frame: &ControlFrame) -> Result<(), TransferError> {
        let text = frame.to_text()?;
        self.channel.send_text(&text).await?;
        Ok(())
    }
}

/// Read until `buf` is full or the source ends. Returns bytes read.
async fn fill_chunk<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
