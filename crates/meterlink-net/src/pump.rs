use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use bytes::Bytes;
use meterlink_frame::{AssemblyStatus, FrameAssembler};
use tracing::debug;

const READ_CHUNK_SIZE: usize = 8 * 1024;

// set_read_timeout rejects a zero Duration.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Terminal state of one connection's read side.
///
/// Exactly one outcome per connection; teardown follows the outcome,
/// never the other way around.
pub(crate) enum FrameOutcome {
    /// The assembler yielded a complete message.
    Complete(Bytes),
    /// The assembler's interval elapsed without a complete message.
    TimedOut,
    /// The peer closed, or the stream turned out malformed.
    Disconnected,
}

/// Drive `assembler` from `stream` until a complete message, the
/// assembler's deadline, or EOF.
///
/// Chunks are fed as they arrive; the assembler must tolerate the message
/// split across an arbitrary number of partial reads. A framing violation
/// is treated like a disconnect: the connection is past saving and no
/// response will be written.
pub(crate) fn await_frame(
    stream: &mut TcpStream,
    assembler: &mut dyn FrameAssembler,
) -> FrameOutcome {
    let deadline = Instant::now() + assembler.timeout();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return FrameOutcome::TimedOut;
        }
        if let Err(err) = stream.set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT))) {
            debug!(%err, "failed to arm read timeout");
            return FrameOutcome::Disconnected;
        }

        match stream.read(&mut chunk) {
            Ok(0) => return FrameOutcome::Disconnected,
            Ok(n) => match assembler.push(&chunk[..n]) {
                Ok(AssemblyStatus::Complete(message)) => return FrameOutcome::Complete(message),
                Ok(AssemblyStatus::Incomplete) => {}
                Err(err) => {
                    debug!(%err, "dropping connection with malformed stream");
                    return FrameOutcome::Disconnected;
                }
            },
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err)
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                return FrameOutcome::TimedOut;
            }
            Err(err) => {
                debug!(%err, "read failed");
                return FrameOutcome::Disconnected;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use bytes::BytesMut;
    use meterlink_frame::{encode_message, LengthPrefixAssembler, MessageConfig};

    use super::*;

    fn assembler(timeout: Duration) -> LengthPrefixAssembler {
        LengthPrefixAssembler::with_config(MessageConfig {
            timeout,
            ..MessageConfig::default()
        })
    }

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn completes_on_single_write() {
        let (mut reader, mut writer) = connected_pair();

        let mut wire = BytesMut::new();
        encode_message(b"one-shot", &mut wire).unwrap();
        writer.write_all(&wire).unwrap();

        let mut asm = assembler(Duration::from_secs(2));
        match await_frame(&mut reader, &mut asm) {
            FrameOutcome::Complete(message) => assert_eq!(message.as_ref(), b"one-shot"),
            _ => panic!("expected a complete message"),
        }
    }

    #[test]
    fn completes_across_many_fragments() {
        let (mut reader, mut writer) = connected_pair();

        let payload = vec![0x5A; 4096];
        let mut wire = BytesMut::new();
        encode_message(&payload, &mut wire).unwrap();

        let fragments: Vec<Vec<u8>> = wire.chunks(7).map(<[u8]>::to_vec).collect();
        let writer_thread = thread::spawn(move || {
            for fragment in fragments {
                writer.write_all(&fragment).unwrap();
                writer.flush().unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let mut asm = assembler(Duration::from_secs(10));
        match await_frame(&mut reader, &mut asm) {
            FrameOutcome::Complete(message) => assert_eq!(message.as_ref(), payload.as_slice()),
            _ => panic!("expected reassembly across fragments"),
        }
        writer_thread.join().unwrap();
    }

    #[test]
    fn times_out_without_a_complete_message() {
        let (mut reader, mut writer) = connected_pair();

        // Header only, payload never arrives.
        let mut wire = BytesMut::new();
        encode_message(b"never sent in full", &mut wire).unwrap();
        writer.write_all(&wire[..HEADER_PREFIX]).unwrap();

        let mut asm = assembler(Duration::from_millis(150));
        assert!(matches!(
            await_frame(&mut reader, &mut asm),
            FrameOutcome::TimedOut
        ));
    }

    const HEADER_PREFIX: usize = 6;

    #[test]
    fn peer_close_is_a_disconnect() {
        let (mut reader, writer) = connected_pair();
        drop(writer);

        let mut asm = assembler(Duration::from_secs(2));
        assert!(matches!(
            await_frame(&mut reader, &mut asm),
            FrameOutcome::Disconnected
        ));
    }

    #[test]
    fn malformed_stream_is_a_disconnect() {
        let (mut reader, mut writer) = connected_pair();
        writer.write_all(&[0xBA, 0xD0, 0, 0, 0, 0, 0, 0]).unwrap();

        let mut asm = assembler(Duration::from_secs(2));
        assert!(matches!(
            await_frame(&mut reader, &mut asm),
            FrameOutcome::Disconnected
        ));
    }
}
