//! End-to-end exercises of the transport facade: two instances on one
//! machine discovering each other over UDP and exchanging one-shot
//! command/response messages over TCP.

use std::net::TcpListener;
use std::sync::mpsc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use meterlink_frame::{encode_message, LengthPrefixFactory, MessageConfig};
use meterlink_net::{Transport, TransportConfig};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn framed(payload: &[u8]) -> Bytes {
    let mut wire = BytesMut::new();
    encode_message(payload, &mut wire).unwrap();
    wire.freeze()
}

/// Responder that frames its reply, so the requesting side's assembler
/// can reconstruct it.
fn responder_config(port: u16, timeout: Duration) -> TransportConfig {
    TransportConfig::builder()
        .port(port)
        .response_handler(|peer, request| {
            let mut reply = BytesMut::new();
            let body = format!(
                "{}:{}",
                peer.ip(),
                String::from_utf8_lossy(request)
            );
            encode_message(body.as_bytes(), &mut reply).unwrap();
            reply.to_vec()
        })
        .assembler_factory(LengthPrefixFactory::with_config(MessageConfig {
            timeout,
            ..MessageConfig::default()
        }))
        .build()
}

#[test]
fn request_response_between_two_instances() {
    let server_port = free_port();
    let mut responder = Transport::new(responder_config(server_port, Duration::from_secs(2)));
    assert!(responder.listen());

    let requester = Transport::new(responder_config(free_port(), Duration::from_secs(2)));
    let (tx, rx) = mpsc::channel();

    requester.send_request(
        framed(b"status?"),
        "127.0.0.1",
        server_port,
        Some(Box::new(move |reply| tx.send(reply).unwrap())),
        Some(Box::new(|| panic!("request must not fail"))),
    );

    let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(reply.as_ref(), b"127.0.0.1:status?");

    responder.stop();
}

#[test]
fn one_stalled_request_does_not_disturb_the_rest() {
    let server_port = free_port();
    let mut responder = Transport::new(responder_config(server_port, Duration::from_secs(5)));
    assert!(responder.listen());

    // A listener that accepts and never answers.
    let silent = TcpListener::bind("127.0.0.1:0").unwrap();
    let silent_port = silent.local_addr().unwrap().port();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        while let Ok((stream, _)) = silent.accept() {
            held.push(stream);
        }
    });

    let requester = Transport::new(
        TransportConfig::builder()
            .port(free_port())
            .assembler_factory(LengthPrefixFactory::with_config(MessageConfig {
                timeout: Duration::from_millis(300),
                ..MessageConfig::default()
            }))
            .build(),
    );

    let (tx, rx) = mpsc::channel::<(u16, Option<Bytes>)>();
    for (tag, port) in [(0u16, silent_port), (1, server_port), (2, server_port)] {
        let ok = tx.clone();
        let err = tx.clone();
        requester.send_request(
            framed(format!("req-{tag}").as_bytes()),
            "127.0.0.1",
            port,
            Some(Box::new(move |reply| ok.send((tag, Some(reply))).unwrap())),
            Some(Box::new(move || err.send((tag, None)).unwrap())),
        );
    }
    drop(tx);

    let mut outcomes = std::collections::HashMap::new();
    for _ in 0..3 {
        let (tag, reply) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        outcomes.insert(tag, reply);
    }

    assert_eq!(outcomes[&0], None, "stalled request must time out");
    assert_eq!(
        outcomes[&1].as_ref().unwrap().as_ref(),
        b"127.0.0.1:req-1"
    );
    assert_eq!(
        outcomes[&2].as_ref().unwrap().as_ref(),
        b"127.0.0.1:req-2"
    );

    responder.stop();
}

#[test]
fn restart_cycles_keep_serving() {
    let server_port = free_port();
    let mut responder = Transport::new(responder_config(server_port, Duration::from_secs(2)));

    for round in 0..3 {
        assert!(responder.listen(), "listen cycle {round} must succeed");

        let requester = Transport::new(responder_config(free_port(), Duration::from_secs(2)));
        let (tx, rx) = mpsc::channel();
        requester.send_request(
            framed(b"alive?"),
            "127.0.0.1",
            server_port,
            Some(Box::new(move |reply| tx.send(reply).unwrap())),
            None,
        );
        let reply = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.as_ref(), b"127.0.0.1:alive?");

        responder.stop();
    }
}

#[test]
fn discovery_datagrams_flow_between_instances() {
    // Ephemeral ports so parallel test runs cannot collide.
    let mut listener = Transport::new(TransportConfig::builder().port(0).build());
    assert!(listener.bind_discovery());
    let listen_port = listener.discovery().local_port().unwrap();

    let mut announcer = Transport::new(TransportConfig::builder().port(0).build());
    assert!(announcer.bind_discovery());

    assert!(announcer.send_datagram(b"here-i-am", Some("127.0.0.1"), listen_port));

    // Loopback delivery is fast but asynchronous; poll the drain.
    let mut received = Vec::new();
    for _ in 0..100 {
        listener.drain_datagrams(|event| received.push(event));
        if !received.is_empty() {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let event = received.first().expect("datagram should arrive");
    assert_eq!(event.payload.as_ref(), b"here-i-am");
    assert_eq!(
        event.sender_port,
        announcer.discovery().local_port().unwrap()
    );

    listener.unbind_discovery();
    announcer.unbind_discovery();
}

#[cfg(debug_assertions)]
#[test]
fn shrunk_receive_buffer_still_reassembles_large_replies() {
    let server_port = free_port();
    let mut responder = Transport::new(
        TransportConfig::builder()
            .port(server_port)
            .response_handler(|_peer, _request| {
                let mut reply = BytesMut::new();
                encode_message(&vec![0xA5u8; 32 * 1024], &mut reply).unwrap();
                reply.to_vec()
            })
            .assembler_factory(LengthPrefixFactory::with_config(MessageConfig {
                timeout: Duration::from_secs(10),
                ..MessageConfig::default()
            }))
            .build(),
    );
    assert!(responder.listen());

    let requester = Transport::new(
        TransportConfig::builder()
            .port(free_port())
            .assembler_factory(LengthPrefixFactory::with_config(MessageConfig {
                timeout: Duration::from_secs(10),
                ..MessageConfig::default()
            }))
            .shrink_client_recv_buffer(true)
            .build(),
    );

    let (tx, rx) = mpsc::channel();
    requester.send_request(
        framed(b"big one, please"),
        "127.0.0.1",
        server_port,
        Some(Box::new(move |reply| tx.send(reply).unwrap())),
        Some(Box::new(|| panic!("fragmented reply must still arrive"))),
    );

    let reply = rx.recv_timeout(Duration::from_secs(15)).unwrap();
    assert_eq!(reply.len(), 32 * 1024);
    assert!(reply.iter().all(|&b| b == 0xA5));

    responder.stop();
}
