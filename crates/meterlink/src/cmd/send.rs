use std::fs;
use std::sync::mpsc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use meterlink_frame::{encode_message, LengthPrefixFactory, MessageConfig};
use meterlink_net::{Transport, TransportConfig};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS, TIMEOUT};
use crate::output::{print_reply, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let mut wire = BytesMut::new();
    encode_message(&payload, &mut wire)
        .map_err(|err| CliError::new(DATA_INVALID, format!("payload rejected: {err}")))?;

    let config = TransportConfig::builder()
        .assembler_factory(LengthPrefixFactory::with_config(MessageConfig {
            timeout,
            ..MessageConfig::default()
        }))
        .build();
    let transport = Transport::new(config);

    // Completion flows back over a channel; the callbacks own the senders.
    let (tx, rx) = mpsc::channel();
    let ok_tx = tx.clone();
    transport.send_request(
        wire.freeze(),
        &args.host,
        args.port,
        Some(Box::new(move |reply: Bytes| {
            let _ = ok_tx.send(Some(reply));
        })),
        Some(Box::new(move || {
            let _ = tx.send(None);
        })),
    );

    // The worker enforces its own connect and reply deadlines; the margin
    // here only covers scheduling.
    let grace = timeout + Duration::from_secs(10);
    match rx.recv_timeout(grace) {
        Ok(Some(reply)) => {
            print_reply(reply.as_ref(), format);
            Ok(SUCCESS)
        }
        Ok(None) => Err(CliError::new(
            TIMEOUT,
            format!("no reply from {}:{}", args.host, args.port),
        )),
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("request to {}:{} never completed", args.host, args.port),
        )),
    }
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}
