use std::net::SocketAddr;
use std::time::Duration;

/// Errors that can occur in transport operations.
///
/// These stay internal to the crate's failure paths: the public surface
/// reports bind/listen/send failures as booleans and request failures
/// through the error callback, with the cause logged.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind the UDP discovery socket.
    #[error("failed to bind udp port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    /// Failed to bind or start the TCP listener.
    #[error("failed to listen on tcp port {port}: {source}")]
    Listen {
        port: u16,
        source: std::io::Error,
    },

    /// Hostname did not resolve to an IPv4 address.
    #[error("failed to resolve host {host:?}")]
    Resolve { host: String },

    /// Failed to connect to the remote endpoint.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// No complete reply arrived within the assembler's interval.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The peer closed the connection before the exchange completed.
    #[error("peer disconnected before the exchange completed")]
    Disconnected,

    /// The inbound byte stream violated the assembler's framing.
    #[error("malformed message: {0}")]
    Frame(#[from] meterlink_frame::FrameError),

    /// An I/O error occurred on a transport socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
