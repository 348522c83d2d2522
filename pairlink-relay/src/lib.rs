//! `Pairlink` relay server library.
//!
//! Exposes the session registry and the WebSocket relay for use in tests
//! and embedding. The relay pairs at most two participants per room and
//! forwards their handshake payloads without reading them.

pub mod config;
pub mod registry;
pub mod relay;
