use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use meterlink_frame::{encode_message, LengthPrefixFactory, MessageConfig};
use meterlink_net::{Transport, TransportConfig};
use tracing::{debug, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_datagram, OutputFormat};

const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;

    let config = TransportConfig::builder()
        .port(args.port)
        .response_handler(|peer, request| {
            debug!(%peer, size = request.len(), "echoing command");
            let mut reply = BytesMut::new();
            if encode_message(request, &mut reply).is_err() {
                return Vec::new();
            }
            reply.to_vec()
        })
        .assembler_factory(LengthPrefixFactory::with_config(MessageConfig {
            timeout,
            ..MessageConfig::default()
        }))
        .build();

    let mut transport = Transport::new(config);
    if !transport.listen() {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("could not listen on tcp port {}", args.port),
        ));
    }
    if !transport.bind_discovery() {
        // Command serving still works without the discovery side.
        warn!(port = args.port, "discovery socket unavailable");
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        transport.drain_datagrams(|event| print_datagram(&event, format));
        std::thread::sleep(DRAIN_INTERVAL);
    }

    transport.stop();
    transport.unbind_discovery();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
