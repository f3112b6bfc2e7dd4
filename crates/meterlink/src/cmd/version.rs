use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("meterlink {}", env!("CARGO_PKG_VERSION"));
    if args.extended {
        println!("default port: {}", meterlink_net::DEFAULT_PORT);
        println!("protocol: udp discovery + one-shot tcp command exchange");
    }
    Ok(SUCCESS)
}
