//! Direct-channel frame vocabulary.
//!
//! Once two peers share a direct channel, every text frame on it is a JSON
//! [`ControlFrame`] and every binary frame is a raw file chunk. A file is
//! sent as one `file-meta`, zero or more chunks, and one `file-end` (or a
//! `file-abort` if the sender gives up part way).
//!
//! Receivers parse text with [`TransferFrame::parse`], which never fails:
//! anything that is not a recognised control frame comes back as
//! [`TransferFrame::Unrecognized`] and is shown as chat text.

use serde::{Deserialize, Serialize};

use crate::codec::{self, CodecError};

/// Default size of one binary chunk (16 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Default buffered-amount threshold at which senders pause (1 MiB).
pub const DEFAULT_HIGH_WATER_MARK: usize = 1024 * 1024;

/// Structured text frames carried on the direct channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ControlFrame {
    /// A chat message.
    Chat {
        /// Message text.
        text: String,
    },

    /// Announces a file; binary chunks follow.
    FileMeta {
        /// File name as given by the sender.
        name: String,
        /// Total size in bytes.
        size: u64,
    },

    /// The last chunk of the current file has been sent.
    FileEnd,

    /// The sender abandoned the current file; discard what was received.
    FileAbort {
        /// Why the transfer was abandoned.
        reason: String,
    },
}

impl ControlFrame {
    /// Encodes this frame as JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if serialization fails.
    pub fn to_text(&self) -> Result<String, CodecError> {
        codec::encode(self)
    }
}

/// Result of parsing an inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferFrame {
    /// A chat message.
    Chat(String),
    /// Start of a file transfer.
    FileMeta {
        /// File name.
        name: String,
        /// Declared size in bytes.
        size: u64,
    },
    /// End of the current file transfer.
    FileEnd,
    /// The sender abandoned the current file.
    FileAbort {
        /// Sender-supplied reason.
        reason: String,
    },
    /// Text that is not a control frame; displayed as chat.
    Unrecognized(String),
}

impl TransferFrame {
    /// Classifies an inbound text frame.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        match codec::decode::<ControlFrame>(text) {
            Ok(ControlFrame::Chat { text }) => Self::Chat(text),
            Ok(ControlFrame::FileMeta { name, size }) => Self::FileMeta { name, size },
            Ok(ControlFrame::FileEnd) => Self::FileEnd,
            Ok(ControlFrame::FileAbort { reason }) => Self::FileAbort { reason },
            Err(_) => Self::Unrecognized(text.to_string()),
        }
    }
}

/// Number of binary frames needed to send `size` bytes in `chunk_size` pieces.
///
/// `chunk_size` must be positive.
#[must_use]
pub const fn chunk_count(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size)
}
