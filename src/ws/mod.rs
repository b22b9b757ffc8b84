//! WebSocket transport: wire protocol and session handling

pub mod handler;
pub mod protocol;
