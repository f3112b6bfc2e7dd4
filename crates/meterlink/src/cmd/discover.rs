use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meterlink_net::{Transport, TransportConfig};

use crate::cmd::DiscoverArgs;
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_datagram, OutputFormat};

const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

pub fn run(args: DiscoverArgs, format: OutputFormat) -> CliResult<i32> {
    let mut transport = Transport::new(TransportConfig::builder().port(args.port).build());
    if !transport.bind_discovery() {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            format!("could not bind udp port {}", args.port),
        ));
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        transport.drain_datagrams(|event| {
            print_datagram(&event, format);
            printed = printed.saturating_add(1);
        });

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
        std::thread::sleep(DRAIN_INTERVAL);
    }

    transport.unbind_discovery();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
