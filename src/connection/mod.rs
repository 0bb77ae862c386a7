//! Connection abstraction over a single bidirectional, text-oriented channel.
//!
//! A connection is split the same way the WebSocket handler splits a socket:
//! - [`Connection`] is the shared half stored in the registry. It owns the
//!   outbound queue feeding a writer task and the link state.
//! - [`Inbound`] is the receive half, driven by the task that runs the
//!   connection's lifecycle.
//!
//! Transports plug in through [`Upgrade`], [`MessageSink`] and
//! [`MessageStream`]. The axum WebSocket transport lives in
//! `crate::websocket`; [`memory`] provides an in-process transport.

mod error;
mod handle;
pub mod memory;
mod transport;
mod types;

pub use error::{ConnectionError, SendError};
pub use handle::{Connection, ConnectionInfo, Inbound};
pub use transport::{MessageSink, MessageStream, Upgrade};
pub use types::{ClientId, ClientIdGenerator};
