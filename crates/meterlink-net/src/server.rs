use std::io::{ErrorKind, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::pump::{await_frame, FrameOutcome};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// One-shot request/response TCP server.
///
/// Each accepted connection gets a fresh assembler from the configured
/// factory and is handled on its own thread: one message in, at most one
/// response out, then close. Connections never share state.
pub struct CommandServer {
    config: Arc<TransportConfig>,
    accept_loop: Option<AcceptLoop>,
}

struct AcceptLoop {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl CommandServer {
    pub(crate) fn new(config: Arc<TransportConfig>) -> Self {
        Self {
            config,
            accept_loop: None,
        }
    }

    /// Stop any previous listener, then bind and start accepting.
    ///
    /// Returns the bind outcome; failure is logged as a warning.
    pub fn listen(&mut self) -> bool {
        self.stop();
        match self.start() {
            Ok(()) => true,
            Err(err) => {
                warn!(port = self.config.port(), %err, "tcp listen failed");
                false
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        let port = self.config.port();
        let listener =
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(|source| {
                TransportError::Listen { port, source }
            })?;
        listener.set_nonblocking(true)?;
        info!(port, "command server listening");

        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let running = Arc::clone(&running);
            let config = Arc::clone(&self.config);
            thread::Builder::new()
                .name("meterlink-accept".into())
                .spawn(move || accept_loop(listener, running, config))?
        };
        self.accept_loop = Some(AcceptLoop { running, thread });
        Ok(())
    }

    /// Idempotent. Closes the listening socket; in-flight connections
    /// complete or time out on their own threads, unaffected.
    pub fn stop(&mut self) {
        if let Some(accept_loop) = self.accept_loop.take() {
            accept_loop.running.store(false, Ordering::SeqCst);
            if accept_loop.thread.join().is_err() {
                warn!("accept loop panicked");
            }
            debug!(port = self.config.port(), "command server stopped");
        }
    }

    /// Whether the accept loop is currently running.
    pub fn is_listening(&self) -> bool {
        self.accept_loop.is_some()
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, running: Arc<AtomicBool>, config: Arc<TransportConfig>) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted command connection");
                let config = Arc::clone(&config);
                let spawned = thread::Builder::new()
                    .name("meterlink-conn".into())
                    .spawn(move || serve_connection(stream, peer, config));
                if let Err(err) = spawned {
                    warn!(%peer, %err, "failed to spawn connection thread");
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => {
                warn!(%err, "accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

/// One request, at most one response, then close.
///
/// Exactly one of {frame-ready, timeout} resolves the connection; after
/// either, the stream is dropped and never revisited.
fn serve_connection(mut stream: TcpStream, peer: SocketAddr, config: Arc<TransportConfig>) {
    let Some(factory) = config.assembler_factory() else {
        debug!(%peer, "no assembler factory configured, closing connection");
        return;
    };
    // The listener is non-blocking; the accepted stream must not be.
    if let Err(err) = stream.set_nonblocking(false) {
        debug!(%peer, %err, "failed to restore blocking mode");
        return;
    }

    let mut assembler = factory.create();
    match await_frame(&mut stream, assembler.as_mut()) {
        FrameOutcome::Complete(message) => {
            if let Some(handler) = config.response_handler() {
                let response = handler.as_ref()(peer, message.as_ref());
                if let Err(err) = write_response(&mut stream, &response) {
                    debug!(%peer, %err, "response write failed");
                }
            } else {
                debug!(%peer, "no response handler configured, closing without reply");
            }
        }
        FrameOutcome::TimedOut => debug!(%peer, "request timed out"),
        FrameOutcome::Disconnected => debug!(%peer, "peer disconnected"),
    }
}

/// The one deliberately blocking step: the response is flushed to the OS
/// before the connection closes.
fn write_response(stream: &mut TcpStream, response: &[u8]) -> std::io::Result<()> {
    stream.write_all(response)?;
    stream.flush()
}
