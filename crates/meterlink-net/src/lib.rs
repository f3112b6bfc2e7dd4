//! UDP discovery and one-shot TCP command exchange for meterlink.
//!
//! Two channels share one well-known port:
//! - [`DiscoveryChannel`]: an unconnected UDP socket for broadcast and
//!   unicast one-shot datagrams, drained into [`DatagramEvent`]s.
//! - [`CommandServer`] / [`CommandClient`]: one request and one response
//!   per TCP connection, then close. Message boundaries come from a
//!   [`FrameAssembler`](meterlink_frame::FrameAssembler) supplied through
//!   the shared [`TransportConfig`].
//!
//! The [`Transport`] facade ties both to a single configuration. Every
//! connection and every outbound request owns its socket, assembler, and
//! worker outright; nothing is shared between flows, so nothing is locked.

pub mod client;
pub mod config;
pub mod discovery;
mod endpoint;
pub mod error;
mod pump;
pub mod server;
pub mod transport;

pub use client::{CommandClient, ErrorCallback, ResponseCallback};
pub use config::{ResponseHandler, TransportConfig, TransportConfigBuilder, DEFAULT_PORT};
pub use discovery::{DatagramEvent, DiscoveryChannel, MAX_DATAGRAM_SIZE};
pub use error::{Result, TransportError};
pub use server::CommandServer;
pub use transport::Transport;
