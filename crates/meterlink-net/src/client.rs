use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use meterlink_frame::FrameAssembler;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::endpoint::resolve_ipv4;
use crate::error::{Result, TransportError};
use crate::pump::{await_frame, FrameOutcome};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(all(unix, debug_assertions))]
const DEBUG_RECV_BUFFER_SIZE: libc::c_int = 100;

/// Invoked with the assembled reply when the request completes.
pub type ResponseCallback = Box<dyn FnOnce(Bytes) + Send>;

/// Invoked when the request fails (resolution, connect, or reply timeout).
pub type ErrorCallback = Box<dyn FnOnce() + Send>;

/// Outbound one-shot command requests.
///
/// Every call to [`send`](Self::send) runs on a fresh worker thread that
/// exclusively owns its socket and assembler; concurrent requests share
/// nothing, so one request's failure cannot touch another.
pub struct CommandClient {
    config: Arc<TransportConfig>,
}

impl CommandClient {
    pub(crate) fn new(config: Arc<TransportConfig>) -> Self {
        Self { config }
    }

    /// Issue one request. Returns immediately.
    ///
    /// A reply is awaited only when an assembler factory is configured and
    /// `on_success` is given; otherwise the request is fire-and-forget.
    /// `on_success` and `on_error` each fire at most once, never both.
    pub fn send(
        &self,
        payload: impl Into<Bytes>,
        host: &str,
        port: u16,
        on_success: Option<ResponseCallback>,
        on_error: Option<ErrorCallback>,
    ) {
        let assembler = match (&on_success, self.config.assembler_factory()) {
            (Some(_), Some(factory)) => Some(factory.create()),
            _ => None,
        };

        let context = RequestContext {
            payload: payload.into(),
            host: host.to_string(),
            port,
            assembler,
            #[cfg(debug_assertions)]
            shrink_recv_buffer: self.config.shrink_client_recv_buffer(),
        };

        let spawned = thread::Builder::new()
            .name("meterlink-request".into())
            .spawn(move || match run_request(context) {
                RequestOutcome::Completed(reply) => {
                    if let Some(callback) = on_success {
                        callback(reply);
                    }
                }
                RequestOutcome::Delivered => {}
                RequestOutcome::Failed(err) => {
                    debug!(%err, "request failed");
                    if let Some(callback) = on_error {
                        callback();
                    }
                }
            });

        if let Err(err) = spawned {
            warn!(%err, "failed to spawn request worker");
        }
    }
}

/// Everything one outbound request exclusively owns.
struct RequestContext {
    payload: Bytes,
    host: String,
    port: u16,
    assembler: Option<Box<dyn FrameAssembler>>,
    #[cfg(debug_assertions)]
    shrink_recv_buffer: bool,
}

/// Terminal state of one request; decides which callback fires.
enum RequestOutcome {
    /// Fire-and-forget payload written; no reply awaited.
    Delivered,
    /// Reply fully assembled.
    Completed(Bytes),
    /// Resolution, connect, write, timeout, or early disconnect.
    Failed(TransportError),
}

fn run_request(mut context: RequestContext) -> RequestOutcome {
    let mut stream = match open_connection(&context) {
        Ok(stream) => stream,
        Err(err) => return RequestOutcome::Failed(err),
    };

    if let Err(err) = stream
        .write_all(context.payload.as_ref())
        .and_then(|()| stream.flush())
    {
        return RequestOutcome::Failed(TransportError::Io(err));
    }

    let Some(assembler) = context.assembler.as_deref_mut() else {
        return RequestOutcome::Delivered;
    };

    let timeout = assembler.timeout();
    match await_frame(&mut stream, assembler) {
        FrameOutcome::Complete(reply) => RequestOutcome::Completed(reply),
        FrameOutcome::TimedOut => RequestOutcome::Failed(TransportError::Timeout(timeout)),
        FrameOutcome::Disconnected => RequestOutcome::Failed(TransportError::Disconnected),
    }
    // The stream drops with the context when the worker returns.
}

fn open_connection(context: &RequestContext) -> Result<TcpStream> {
    let addr = resolve_ipv4(&context.host, context.port)?;
    let stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)
        .map_err(|source| TransportError::Connect { addr, source })?;

    #[cfg(debug_assertions)]
    if context.shrink_recv_buffer {
        shrink_recv_buffer(&stream);
    }

    Ok(stream)
}

/// Force replies to arrive in many small fragments. Granularity only,
/// never correctness.
#[cfg(all(unix, debug_assertions))]
fn shrink_recv_buffer(stream: &TcpStream) {
    use std::os::fd::AsRawFd;

    let size = DEBUG_RECV_BUFFER_SIZE;
    // SAFETY: the fd is an open socket owned by this process, and the
    // option value points at a live c_int of the advertised length.
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            (&size as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        debug!("SO_RCVBUF shrink failed");
    }
}

#[cfg(all(not(unix), debug_assertions))]
fn shrink_recv_buffer(_stream: &TcpStream) {}
