//! Shared protocol definitions for the `Pairlink` relay and direct channel.

pub mod codec;
pub mod frame;
pub mod signal;
