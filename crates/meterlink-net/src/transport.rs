use std::sync::Arc;

use bytes::Bytes;

use crate::client::{CommandClient, ErrorCallback, ResponseCallback};
use crate::config::TransportConfig;
use crate::discovery::{DatagramEvent, DiscoveryChannel};
use crate::server::CommandServer;

/// The remote-control transport facade.
///
/// Owns the discovery channel and the command server, and issues outbound
/// requests, all parameterized by one shared, immutable
/// [`TransportConfig`]. Accept-side and connect-side flows use the
/// configured response handler and assembler factory independently and
/// concurrently; correlation is implicit in which flow owns which socket.
pub struct Transport {
    config: Arc<TransportConfig>,
    discovery: DiscoveryChannel,
    server: CommandServer,
    client: CommandClient,
}

impl Transport {
    /// Build the facade around a finished configuration.
    pub fn new(config: TransportConfig) -> Self {
        let config = Arc::new(config);
        Self {
            discovery: DiscoveryChannel::new(config.port()),
            server: CommandServer::new(Arc::clone(&config)),
            client: CommandClient::new(Arc::clone(&config)),
            config,
        }
    }

    /// The well-known port shared by discovery and command channels.
    pub fn port(&self) -> u16 {
        self.config.port()
    }

    /// The configuration this transport was built with.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Bind the discovery socket. See [`DiscoveryChannel::bind`].
    pub fn bind_discovery(&mut self) -> bool {
        self.discovery.bind()
    }

    /// Close the discovery socket. Idempotent.
    pub fn unbind_discovery(&mut self) {
        self.discovery.unbind()
    }

    /// Send one discovery datagram; broadcast when `host` is `None`.
    pub fn send_datagram(&self, payload: &[u8], host: Option<&str>, port: u16) -> bool {
        self.discovery.send(payload, host, port)
    }

    /// Surface every pending datagram, in arrival order. Never blocks.
    pub fn drain_datagrams<F>(&self, on_datagram: F)
    where
        F: FnMut(DatagramEvent),
    {
        self.discovery.drain(on_datagram)
    }

    /// Direct access to the discovery channel.
    pub fn discovery(&self) -> &DiscoveryChannel {
        &self.discovery
    }

    /// Start (or restart) the command server. See [`CommandServer::listen`].
    pub fn listen(&mut self) -> bool {
        self.server.listen()
    }

    /// Stop the command server. Idempotent; in-flight connections finish.
    pub fn stop(&mut self) {
        self.server.stop()
    }

    /// Whether the command server is accepting connections.
    pub fn is_listening(&self) -> bool {
        self.server.is_listening()
    }

    /// Issue one outbound request. See [`CommandClient::send`].
    pub fn send_request(
        &self,
        payload: impl Into<Bytes>,
        host: &str,
        port: u16,
        on_success: Option<ResponseCallback>,
        on_error: Option<ErrorCallback>,
    ) {
        self.client.send(payload, host, port, on_success, on_error)
    }
}
