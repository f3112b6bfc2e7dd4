use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use meterlink_frame::AssemblerFactory;

/// Well-known port shared by the UDP discovery socket and the TCP listener.
pub const DEFAULT_PORT: u16 = 8777;

/// Turns one inbound request into the response bytes written back.
pub type ResponseHandler = dyn Fn(SocketAddr, &[u8]) -> Vec<u8> + Send + Sync;

/// Shared transport configuration.
///
/// Built once, before any traffic, and handed to the facade; server and
/// client read it through a shared `Arc`. There is no way to reconfigure a
/// transport with requests in flight; replace the whole facade instead.
pub struct TransportConfig {
    port: u16,
    response_handler: Option<Arc<ResponseHandler>>,
    assembler_factory: Option<Arc<dyn AssemblerFactory>>,
    #[cfg(debug_assertions)]
    shrink_client_recv_buffer: bool,
}

impl TransportConfig {
    /// Start building a configuration.
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }

    /// The port used by both discovery and command channels.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn response_handler(&self) -> Option<&Arc<ResponseHandler>> {
        self.response_handler.as_ref()
    }

    pub(crate) fn assembler_factory(&self) -> Option<&Arc<dyn AssemblerFactory>> {
        self.assembler_factory.as_ref()
    }

    #[cfg(debug_assertions)]
    pub(crate) fn shrink_client_recv_buffer(&self) -> bool {
        self.shrink_client_recv_buffer
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("port", &self.port)
            .field("response_handler", &self.response_handler.is_some())
            .field("assembler_factory", &self.assembler_factory.is_some())
            .finish()
    }
}

/// Builder for [`TransportConfig`].
#[derive(Default)]
pub struct TransportConfigBuilder {
    port: Option<u16>,
    response_handler: Option<Arc<ResponseHandler>>,
    assembler_factory: Option<Arc<dyn AssemblerFactory>>,
    #[cfg(debug_assertions)]
    shrink_client_recv_buffer: bool,
}

impl TransportConfigBuilder {
    /// Override the well-known port (tests, co-located instances).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Function invoked with `(peer address, request bytes)` for every
    /// complete inbound request; its return value is written back verbatim.
    pub fn response_handler<H>(mut self, handler: H) -> Self
    where
        H: Fn(SocketAddr, &[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.response_handler = Some(Arc::new(handler));
        self
    }

    /// Factory producing one fresh assembler per connection or request.
    pub fn assembler_factory<F>(mut self, factory: F) -> Self
    where
        F: AssemblerFactory + 'static,
    {
        self.assembler_factory = Some(Arc::new(factory));
        self
    }

    /// Shrink the outbound socket's receive buffer to a small fixed size,
    /// so replies arrive in many fragments. Debug builds only; release
    /// builds do not carry this knob at all.
    #[cfg(debug_assertions)]
    pub fn shrink_client_recv_buffer(mut self, enable: bool) -> Self {
        self.shrink_client_recv_buffer = enable;
        self
    }

    /// Finish building.
    pub fn build(self) -> TransportConfig {
        TransportConfig {
            port: self.port.unwrap_or(DEFAULT_PORT),
            response_handler: self.response_handler,
            assembler_factory: self.assembler_factory,
            #[cfg(debug_assertions)]
            shrink_client_recv_buffer: self.shrink_client_recv_buffer,
        }
    }
}
