use meterlink_net::DiscoveryChannel;

use crate::cmd::AnnounceArgs;
use crate::exit::{CliError, CliResult, SUCCESS, TRANSPORT_ERROR};

pub fn run(args: AnnounceArgs) -> CliResult<i32> {
    // Ephemeral source port: announcing must not collide with a local
    // responder bound to the well-known port.
    let mut channel = DiscoveryChannel::new(0);
    if !channel.bind() {
        return Err(CliError::new(
            TRANSPORT_ERROR,
            "could not open a udp socket for announcing",
        ));
    }

    let delivered = channel.send(args.data.as_bytes(), args.host.as_deref(), args.port);
    channel.unbind();

    if delivered {
        Ok(SUCCESS)
    } else {
        let target = args.host.as_deref().unwrap_or("<broadcast>");
        Err(CliError::new(
            TRANSPORT_ERROR,
            format!("datagram to {target}:{} was not delivered", args.port),
        ))
    }
}
