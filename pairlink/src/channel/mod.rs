//! Direct-channel abstraction for `Pairlink`.
//!
//! Defines the [`DataChannel`] trait the transfer engine runs on. A data
//! channel is an ordered, reliable, message-oriented pipe between two peers
//! that carries both text and binary messages and reports how many bytes
//! it has accepted but not yet put on the wire (its *buffered amount*).
//!
//! Concrete implementations:
//! - [`loopback::LoopbackChannel`]: in-process pair used by tests and demos

pub mod loopback;

/// One message taken off a data channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// A text message (control frame or stray chat text).
    Text(String),
    /// A binary message (file chunk).
    Binary(Vec<u8>),
}

impl ChannelMessage {
    /// Size in bytes counted against the buffered amount.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
        }
    }

    /// Whether the message carries no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Errors that can occur on a data channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel has been closed by either side.
    #[error("channel closed")]
    Closed,

    /// An underlying I/O error occurred.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Async data channel between two peers.
///
/// # Invariant
///
/// Messages are delivered in the order they were sent, text and binary
/// interleaved. `buffered_amount` never counts a message that the far side
/// has already received.
pub trait DataChannel: Send + Sync {
    /// Queue a text message.
    fn send_text(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;

    /// Queue a binary message.
    fn send_binary(
        &self,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;

    /// Bytes queued on this side that the far side has not yet taken.
    fn buffered_amount(&self) -> usize;

    /// Resolve once the buffered amount is below `threshold`.
    ///
    /// This is the low-water notification senders park on. Returns
    /// [`ChannelError::Closed`] if the channel closes while waiting.
    fn wait_drained(
        &self,
        threshold: usize,
    ) -> impl std::future::Future<Output = Result<(), ChannelError>> + Send;

    /// Receive the next message sent by the far side.
    fn recv(&self)
    -> impl std::future::Future<Output = Result<ChannelMessage, ChannelError>> + Send;

    /// Close the channel for both sides.
    fn close(&self);
}
