use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::endpoint::resolve_ipv4;
use crate::error::{Result, TransportError};

/// Largest datagram the drain loop can receive in one piece.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// One received UDP packet, surfaced to the owning application.
#[derive(Debug, Clone)]
pub struct DatagramEvent {
    /// Address the packet was sent from.
    pub sender_addr: IpAddr,
    /// Source port of the packet.
    pub sender_port: u16,
    /// The packet contents, opaque to this layer.
    pub payload: Bytes,
}

/// Unconnected UDP socket for one-shot broadcast/unicast discovery.
///
/// Datagrams never cross a router hop: multicast TTL is pinned to 1 and
/// broadcast uses the limited broadcast address, so exchange stays within
/// the local subnet.
pub struct DiscoveryChannel {
    port: u16,
    socket: Option<UdpSocket>,
}

impl DiscoveryChannel {
    /// Channel bound (later, via [`bind`](Self::bind)) to the given port.
    ///
    /// Port 0 binds an ephemeral port, for send-only channels.
    pub fn new(port: u16) -> Self {
        Self { port, socket: None }
    }

    /// Close any previous binding, then bind to the wildcard IPv4 address.
    ///
    /// Returns false and logs a warning on failure.
    pub fn bind(&mut self) -> bool {
        self.unbind();
        match self.open_socket() {
            Ok(socket) => {
                info!(port = self.port, "discovery channel bound");
                self.socket = Some(socket);
                true
            }
            Err(err) => {
                warn!(port = self.port, %err, "discovery bind failed");
                false
            }
        }
    }

    fn open_socket(&self) -> Result<UdpSocket> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.port)).map_err(|source| {
            TransportError::Bind {
                port: self.port,
                source,
            }
        })?;
        socket.set_broadcast(true)?;
        socket.set_multicast_ttl_v4(1)?;
        socket.set_nonblocking(true)?;
        Ok(socket)
    }

    /// Idempotent; closes the socket if open.
    pub fn unbind(&mut self) {
        if self.socket.take().is_some() {
            debug!(port = self.port, "discovery channel closed");
        }
    }

    /// Whether the channel currently holds a bound socket.
    pub fn is_bound(&self) -> bool {
        self.socket.is_some()
    }

    /// The port this channel binds to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The actual bound port, once bound. Differs from [`port`](Self::port)
    /// for ephemeral (port 0) channels.
    pub fn local_port(&self) -> Option<u16> {
        self.socket
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
            .map(|addr| addr.port())
    }

    /// Send one datagram.
    ///
    /// Destination is the limited broadcast address when `host` is `None`
    /// or empty, otherwise the given host. True iff the OS accepted exactly
    /// `payload.len()` bytes; no retry on partial send.
    pub fn send(&self, payload: &[u8], host: Option<&str>, port: u16) -> bool {
        let Some(socket) = &self.socket else {
            warn!("send on unbound discovery channel");
            return false;
        };

        let destination = match destination(host, port) {
            Ok(destination) => destination,
            Err(err) => {
                warn!(%err, "discovery send failed");
                return false;
            }
        };

        match socket.send_to(payload, destination) {
            Ok(sent) => sent == payload.len(),
            Err(err) => {
                warn!(%destination, %err, "discovery send failed");
                false
            }
        }
    }

    /// Receive every pending datagram, in arrival order.
    ///
    /// Emits one event per packet until the socket's queue is drained, so
    /// the pending queue cannot grow without bound between invocations.
    /// Never blocks.
    pub fn drain<F>(&self, mut on_datagram: F)
    where
        F: FnMut(DatagramEvent),
    {
        let Some(socket) = &self.socket else {
            return;
        };

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, sender)) => on_datagram(DatagramEvent {
                    sender_addr: sender.ip(),
                    sender_port: sender.port(),
                    payload: Bytes::copy_from_slice(&buf[..len]),
                }),
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "discovery receive failed");
                    break;
                }
            }
        }
    }
}

fn destination(host: Option<&str>, port: u16) -> Result<SocketAddr> {
    match host {
        None | Some("") => Ok(SocketAddr::from((Ipv4Addr::BROADCAST, port))),
        Some(host) => resolve_ipv4(host, port),
    }
}
