//! `Pairlink` peer library: relay signaling client and chunked file/chat
//! transfer over a direct data channel.

pub mod channel;
pub mod config;
pub mod signaling;
pub mod transfer;
