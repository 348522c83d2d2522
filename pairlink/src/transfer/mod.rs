//! File and chat transfer over a direct data channel.
//!
//! The [`TransferEngine`] runs once per established channel and is
//! symmetric: both peers send and receive through the same engine type.
//!
//! - Send side ([`send`]): `file-meta`, then the file in fixed-size binary
//!   chunks with buffered-amount backpressure, then `file-end`.
//! - Receive side ([`receive`]): a [`Reassembler`](receive::Reassembler)
//!   turns the frame stream back into [`TransferEvent`]s.

pub mod receive;
pub mod send;

use std::sync::atomic::AtomicBool;

use pairlink_proto::codec::CodecError;
use pairlink_proto::frame::{DEFAULT_CHUNK_SIZE, DEFAULT_HIGH_WATER_MARK};

use crate::channel::{ChannelError, DataChannel};

/// Errors returned to the caller of a send operation.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The data channel failed or closed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// A control frame could not be serialized.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Reading the file source failed.
    #[error("failed to read file source: {0}")]
    Read(#[from] std::io::Error),

    /// The file source ended before the declared size.
    #[error("file source ended after {read} of {expected} bytes")]
    ShortRead {
        /// Bytes actually read.
        read: u64,
        /// Size announced in `file-meta`.
        expected: u64,
    },

    /// Another file is already being sent on this engine.
    #[error("another file transfer is already in progress")]
    TransferInProgress,

    /// The path has no usable file name.
    #[error("path has no file name: {0}")]
    NoFileName(String),

    /// A [`TransferConfig`] value is zero.
    #[error("invalid transfer config: {0} must be positive")]
    InvalidConfig(&'static str),
}

/// Receive-side protocol violations. Reported as events, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReceiveError {
    /// A binary chunk arrived with no `file-meta` before it.
    #[error("discarded {len}-byte chunk: no file transfer in progress")]
    ChunkWithoutMetadata {
        /// Size of the discarded chunk.
        len: usize,
    },

    /// A binary chunk would take the file past its declared size.
    #[error("discarded {len}-byte chunk: {received} of {size} bytes already received")]
    ChunkExceedsSize {
        /// Size of the discarded chunk.
        len: usize,
        /// Bytes kept so far.
        received: u64,
        /// Size declared in `file-meta`.
        size: u64,
    },
}

/// Tuning for the send path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Bytes per binary frame (the last frame may be shorter).
    pub chunk_size: usize,
    /// Buffered amount at which the sender pauses until the channel drains.
    pub high_water_mark: usize,
}

impl TransferConfig {
    /// Check that both values are non-zero.
    ///
    /// A zero chunk size never advances the send loop, and a zero
    /// high-water mark never lets it resume.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidConfig`] naming the zero field.
    pub const fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::InvalidConfig("chunk_size"));
        }
        if self.high_water_mark == 0 {
            return Err(TransferError::InvalidConfig("high_water_mark"));
        }
        Ok(())
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
        }
    }
}

/// Why a partially received file was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The sender sent `file-abort`.
    Sender(String),
    /// A new `file-meta` arrived before `file-end`.
    Superseded,
    /// The channel closed mid-transfer.
    ChannelClosed,
}

/// A fully reassembled file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Name from `file-meta`.
    pub name: String,
    /// Size declared in `file-meta`.
    pub size: u64,
    /// Chunks concatenated in arrival order.
    pub data: Vec<u8>,
}

/// Events emitted by the receive side for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// A chat message (or unrecognized text shown as chat).
    Chat(String),
    /// A new incoming file was announced.
    FileStarted {
        /// File name.
        name: String,
        /// Declared size in bytes.
        size: u64,
    },
    /// A chunk of the current file arrived.
    Progress {
        /// File name.
        name: String,
        /// Bytes received so far.
        received: u64,
        /// Declared size in bytes.
        size: u64,
        /// Rounded percentage, clamped to 100.
        percent: u8,
    },
    /// The current file completed.
    FileReceived(ReceivedFile),
    /// The current file was dropped before completion.
    Aborted {
        /// File name.
        name: String,
        /// Bytes that had been received.
        received: u64,
        /// Why it was dropped.
        reason: AbortReason,
    },
    /// An inbound frame violated the transfer protocol and was discarded.
    Rejected(ReceiveError),
}

/// Outcome of a completed file send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSummary {
    /// File name announced in `file-meta`.
    pub name: String,
    /// Bytes sent.
    pub bytes: u64,
    /// Binary frames sent.
    pub chunks: u64,
}

/// Chunked, backpressured transfer engine over one data channel.
///
/// Share it behind an `Arc` to run [`run_receiver`](Self::run_receiver)
/// in one task while sending from another.
pub struct TransferEngine<C: DataChannel> {
    channel: C,
    config: TransferConfig,
    /// Set while a `send_file` is in flight.
    sending: AtomicBool,
}

impl<C: DataChannel> TransferEngine<C> {
    /// Create an engine over an established channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidConfig`] if `config` has a zero
    /// chunk size or high-water mark.
    pub fn new(channel: C, config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self {
            channel,
            config,
            sending: AtomicBool::new(false),
        })
    }

    /// The underlying channel.
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// The active send tuning.
    pub const fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Close the channel. A running receiver aborts any partial file.
    pub fn close(&self) {
        self.channel.close();
    }
}

/// Rounded percentage of `received` out of `size`, clamped to 100.
///
/// A zero-byte file reports 0 until `file-end` sets it to 100.
#[must_use]
pub fn progress_percent(received: u64, size: u64) -> u8 {
    if size == 0 {
        return 0;
    }
    let received = u128::from(received);
    let size = u128::from(size);
    let rounded = (received * 200 + size) / (size * 2);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}
