//! Downstream (backend) MCP connections: one transport per live backend,
//! wrapped with the MCP handshake and the typed RPC surface the Dispatcher
//! calls through.

pub mod client;
pub mod transport;

pub use client::{BackendClient, BackendError};
pub use transport::BackendTransport;
