//! End-to-end tests against a local `tungstenite` server.

mod test_utils;

use std::{
    net::{SocketAddr, TcpListener},
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, unbounded};
use rstest::{fixture, rstest};
use test_utils::wait_for;
use tungstenite::Message;
use tyme_link::{
    CloseReason, ConnectionBuilder, FrameMode, Payload, WebSocketTransport,
    connection::testing::{Recorded, RecordingListener},
};

#[fixture]
fn tcp_listener() -> TcpListener {
    TcpListener::bind(("127.0.0.1", 0)).expect("bind ephemeral listener")
}

fn address(addr: SocketAddr) -> String {
    format!("ws://{addr}/c/ws")
}

/// Accept one client and echo every data frame until it disconnects.
fn spawn_echo_server(listener: TcpListener) -> SocketAddr {
    let addr = listener.local_addr().expect("listener address");
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let Ok(mut socket) = tungstenite::accept(stream) else {
            return;
        };
        while let Ok(message) = socket.read() {
            if message.is_text() || message.is_binary() {
                if socket.send(message).is_err() {
                    return;
                }
            }
        }
    });
    addr
}

/// Accept clients in turn. Each gets `greeting`, then the server reports
/// what it receives and closes the session after `close_after` frames.
fn spawn_scripted_server(
    listener: TcpListener,
    sessions: usize,
    close_after: usize,
) -> (SocketAddr, Receiver<(usize, String)>) {
    let addr = listener.local_addr().expect("listener address");
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for session in 0..sessions {
            let Ok((stream, _)) = listener.accept() else {
                return;
            };
            let Ok(mut socket) = tungstenite::accept(stream) else {
                return;
            };
            let _ = socket.send(Message::Text(format!("hello {session}")));
            let mut received = 0;
            while received < close_after {
                match socket.read() {
                    Ok(Message::Text(text)) => {
                        received += 1;
                        let _ = tx.send((session, text));
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
            let _ = socket.close(None);
            while socket.read().is_ok() {}
        }
    });
    (addr, rx)
}

#[rstest]
fn echoes_text_frames(tcp_listener: TcpListener) {
    let addr = spawn_echo_server(tcp_listener);
    let listener = RecordingListener::new();
    let connection = ConnectionBuilder::new(address(addr))
        .build_with_transport(WebSocketTransport::new(), listener.clone())
        .expect("valid connection configuration");

    connection.send("hello");
    assert!(wait_for(|| listener
        .events()
        .contains(&Recorded::Message(Payload::from("hello")))));
    assert_eq!(listener.events()[0], Recorded::Open);
    connection.destroy();
    assert_eq!(
        listener.events().last(),
        Some(&Recorded::Close(CloseReason::Operator))
    );
}

#[rstest]
fn binary_mode_delivers_bytes(tcp_listener: TcpListener) {
    let addr = spawn_echo_server(tcp_listener);
    let listener = RecordingListener::new();
    let connection = ConnectionBuilder::new(address(addr))
        .with_mode(FrameMode::Binary)
        .build_with_transport(WebSocketTransport::new(), listener.clone())
        .expect("valid connection configuration");

    connection.send("abc");
    assert!(wait_for(|| listener
        .events()
        .contains(&Recorded::Message(Payload::Binary(b"abc".to_vec())))));
    connection.destroy();
}

#[rstest]
fn server_close_triggers_reconnect(tcp_listener: TcpListener) {
    let (addr, received) = spawn_scripted_server(tcp_listener, 2, 1);
    let listener = RecordingListener::new();
    let connection = ConnectionBuilder::new(address(addr))
        .with_reconnect_delay_ms(50)
        .build_with_transport(WebSocketTransport::new(), listener.clone())
        .expect("valid connection configuration");

    assert!(wait_for(|| listener
        .events()
        .contains(&Recorded::Message(Payload::from("hello 0")))));
    connection.send("first");
    let (session, text) = received
        .recv_timeout(Duration::from_secs(5))
        .expect("first frame reaches server");
    assert_eq!((session, text.as_str()), (0, "first"));

    assert!(wait_for(|| listener
        .events()
        .contains(&Recorded::Message(Payload::from("hello 1")))));
    let events = listener.events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, Recorded::Close(CloseReason::Abnormal { .. }))),
        "expected an abnormal close in {events:?}"
    );
    assert_eq!(
        events.iter().filter(|event| **event == Recorded::Open).count(),
        2
    );

    connection.send("second");
    let (session, text) = received
        .recv_timeout(Duration::from_secs(5))
        .expect("second frame reaches server");
    assert_eq!((session, text.as_str()), (1, "second"));
    connection.destroy();
}

#[rstest]
fn unreachable_server_reports_establishment_failure(tcp_listener: TcpListener) {
    let addr = tcp_listener.local_addr().expect("listener address");
    drop(tcp_listener);
    let listener = RecordingListener::new();
    let connection = ConnectionBuilder::new(address(addr))
        .with_reconnect(false)
        .with_connect_timeout_ms(500)
        .build_with_transport(WebSocketTransport::new(), listener.clone())
        .expect("valid connection configuration");

    assert!(wait_for(|| listener.events() == vec![Recorded::EstablishmentFailure]));
    connection.destroy();
}
