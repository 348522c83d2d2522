//! Receive pipeline for [`TransferEngine`].
//!
//! [`Reassembler`] is a pure state machine: feed it channel messages and it
//! returns the [`TransferEvent`]s they produce. [`TransferEngine::run_receiver`]
//! pumps the channel through it until the channel closes.

use tokio::sync::mpsc;

use pairlink_proto::frame::TransferFrame;

use crate::channel::{ChannelError, ChannelMessage, DataChannel};

use super::{
    AbortReason, ReceiveError, ReceivedFile, TransferEngine, TransferError, TransferEvent,
    progress_percent,
};

/// A file being received.
#[derive(Debug)]
struct IncomingFile {
    name: String,
    size: u64,
    chunks: Vec<Vec<u8>>,
    received: u64,
}

/// Rebuilds files and chat from the inbound frame stream.
///
/// At most one file is in progress. Chunks are kept in arrival order and
/// only concatenated on `file-end`. A file never buffers more than its
/// declared size; chunks past it are rejected.
#[derive(Debug, Default)]
pub struct Reassembler {
    active: Option<IncomingFile>,
    progress: u8,
}

impl Reassembler {
    /// Create an idle reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage of the current (or last completed) file.
    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    /// Whether a file is currently being received.
    #[must_use]
    pub const fn is_receiving(&self) -> bool {
        self.active.is_some()
    }

    /// Process one channel message.
    pub fn handle(&mut self, message: ChannelMessage) -> Vec<TransferEvent> {
        match message {
            ChannelMessage::Text(text) => self.on_text(&text),
            ChannelMessage::Binary(data) => vec![self.on_chunk(data)],
        }
    }

    /// Process one text frame.
    pub fn on_text(&mut self, text: &str) -> Vec<TransferEvent> {
        match TransferFrame::parse(text) {
            TransferFrame::Chat(text) | TransferFrame::Unrecognized(text) => {
                vec![TransferEvent::Chat(text)]
            }
            TransferFrame::FileMeta { name, size } => {
                let mut events = Vec::with_capacity(2);
                if let Some(event) = self.abort(AbortReason::Superseded) {
                    events.push(event);
                }
                tracing::debug!(file = %name, size, "incoming file");
                self.active = Some(IncomingFile {
                    name: name.clone(),
                    size,
                    chunks: Vec::new(),
                    received: 0,
                });
                self.progress = 0;
                events.push(TransferEvent::FileStarted { name, size });
                events
            }
            TransferFrame::FileEnd => self.finish().into_iter().collect(),
            TransferFrame::FileAbort { reason } => {
                self.abort(AbortReason::Sender(reason)).into_iter().collect()
            }
        }
    }

    /// Process one binary chunk.
    pub fn on_chunk(&mut self, data: Vec<u8>) -> TransferEvent {
        let Some(file) = self.active.as_mut() else {
            tracing::warn!(len = data.len(), "chunk with no file in progress, discarding");
            return TransferEvent::Rejected(ReceiveError::ChunkWithoutMetadata { len: data.len() });
        };

        let len = data.len() as u64;
        if file.received.saturating_add(len) > file.size {
            tracing::warn!(
                file = %file.name,
                len,
                received = file.received,
                size = file.size,
                "chunk runs past declared size, discarding"
            );
            return TransferEvent::Rejected(ReceiveError::ChunkExceedsSize {
                len: data.len(),
                received: file.received,
                size: file.size,
            });
        }

        file.received += len;
        file.chunks.push(data);
        self.progress = progress_percent(file.received, file.size);

        TransferEvent::Progress {
            name: file.name.clone(),
            received: file.received,
            size: file.size,
            percent: self.progress,
        }
    }

    /// The channel closed: drop any partial file.
    pub fn on_close(&mut self) -> Option<TransferEvent> {
        self.abort(AbortReason::ChannelClosed)
    }

    fn finish(&mut self) -> Option<TransferEvent> {
        let Some(file) = self.active.take() else {
            tracing::warn!("file-end with no file in progress, ignoring");
            return None;
        };

        if file.received != file.size {
            tracing::warn!(
                file = %file.name,
                declared = file.size,
                received = file.received,
                "received size differs from declared size"
            );
        }

        self.progress = 100;
        tracing::info!(file = %file.name, size = file.received, "file received");
        Some(TransferEvent::FileReceived(ReceivedFile {
            name: file.name,
            size: file.size,
            data: file.chunks.concat(),
        }))
    }

    fn abort(&mut self, reason: AbortReason) -> Option<TransferEvent> {
        let file = self.active.take()?;
        self.progress = 0;
        tracing::warn!(file = %file.name, received = file.received, ?reason, "file transfer aborted");
        Some(TransferEvent::Aborted {
            name: file.name,
            received: file.received,
            reason,
        })
    }
}

impl<C: DataChannel> TransferEngine<C> {
    /// Receive frames until the channel closes, emitting events on `events`.
    ///
    /// Returns `Ok(())` when the channel closes or the event receiver is
    /// dropped. A partial file is aborted either way.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Channel`] on a channel failure other than
    /// a clean close.
    pub async fn run_receiver(
        &self,
        events: mpsc::Sender<TransferEvent>,
    ) -> Result<(), TransferError> {
        let mut reassembler = Reassembler::new();

        loop {
            let message = match self.channel.recv().await {
                Ok(message) => message,
                Err(ChannelError::Closed) => {
                    tracing::debug!("channel closed, receiver stopping");
                    if let Some(event) = reassembler.on_close() {
                        let _ = events.send(event).await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    if let Some(event) = reassembler.on_close() {
                        let _ = events.send(event).await;
                    }
                    return Err(e.into());
                }
            };

            for event in reassembler.handle(message) {
                if events.send(event).await.is_err() {
                    tracing::debug!("event receiver dropped, receiver stopping");
                    return Ok(());
                }
            }
        }
    }
}
