//! WebSocket endpoint: wire protocol, connection fan-out and dispatch

pub mod dispatch;
pub mod handler;
pub mod hub;
pub mod protocol;
