//! WebSocket transport built on `tungstenite`.
//!
//! Each connection attempt runs on its own I/O thread. The thread dials the
//! server, performs the (optionally TLS) handshake, then alternates between
//! writing queued outbound frames and polling for inbound frames with a short
//! read timeout. Results travel back to the state machine through the
//! [`EventSink`]. When the session fails, frames the handle accepted but the
//! thread never wrote are reported as [`TransportEvent::Unsent`](super::TransportEvent::Unsent).

use std::{
    collections::VecDeque,
    io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::{debug, warn};
use native_tls::TlsConnector;
use parking_lot::Mutex;
use tungstenite::{
    Connector, HandshakeError, Message, WebSocket,
    protocol::{CloseFrame, frame::coding::CloseCode},
    stream::MaybeTlsStream,
};
use url::Url;

use super::{
    config::{FrameMode, TlsOptions},
    payload::Payload,
    transport::{EventSink, OpenTarget, Transport, TransportError, TransportHandle},
};

/// How long a read blocks before the I/O thread services outbound frames.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(25);

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Transport speaking the WebSocket protocol over TCP or TLS.
#[derive(Clone, Debug, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(
        &mut self,
        target: &OpenTarget,
        sink: EventSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let outbox = Arc::new(Mutex::new(Outbox::default()));
        let target = target.clone();
        let name = format!("tyme-link-io-{}", sink.generation());
        let io_outbox = Arc::clone(&outbox);
        thread::Builder::new()
            .name(name)
            .spawn(move || io_loop(target, sink, io_outbox))?;
        Ok(Box::new(WebSocketHandle { outbox }))
    }
}

/// Frames accepted by the handle and not yet taken by the I/O thread.
///
/// Once `accepting` is cleared the handle rejects further payloads, so
/// everything it ever accepted is either written or reclaimed.
#[derive(Debug)]
struct Outbox {
    frames: VecDeque<Payload>,
    accepting: bool,
    close_requested: bool,
}

impl Default for Outbox {
    fn default() -> Self {
        Self {
            frames: VecDeque::new(),
            accepting: true,
            close_requested: false,
        }
    }
}

impl Outbox {
    fn push(&mut self, payload: Payload) -> Result<(), TransportError> {
        if !self.accepting {
            return Err(TransportError::Closed);
        }
        self.frames.push_back(payload);
        Ok(())
    }

    fn request_close(&mut self) {
        self.accepting = false;
        self.close_requested = true;
    }

    /// Stop accepting and hand back everything still queued.
    fn seal(&mut self) -> Vec<Payload> {
        self.accepting = false;
        self.frames.drain(..).collect()
    }
}

type SharedOutbox = Arc<Mutex<Outbox>>;

struct WebSocketHandle {
    outbox: SharedOutbox,
}

impl TransportHandle for WebSocketHandle {
    fn send(&mut self, payload: Payload) -> Result<(), TransportError> {
        self.outbox.lock().push(payload)
    }

    fn close(&mut self) {
        self.outbox.lock().request_close();
    }
}

impl Drop for WebSocketHandle {
    fn drop(&mut self) {
        self.outbox.lock().request_close();
    }
}

fn io_loop(target: OpenTarget, sink: EventSink, outbox: SharedOutbox) {
    let mut socket = match establish(&target) {
        Ok(socket) => socket,
        Err(err) => {
            debug!("websocket handshake with {} failed: {err}", target.address);
            sink.error(err);
            return;
        }
    };
    if !sink.opened() {
        let _ = socket.close(None);
        return;
    }
    let mut session = Session {
        socket,
        sink,
        mode: target.mode,
        outbox,
        close_frame: None,
        closing_since: None,
        close_timeout: target.connect_timeout,
    };
    session.run();
}

struct Session {
    socket: Socket,
    sink: EventSink,
    mode: FrameMode,
    outbox: SharedOutbox,
    close_frame: Option<CloseFrame<'static>>,
    closing_since: Option<Instant>,
    close_timeout: Duration,
}

enum Step {
    Continue,
    Finished,
}

impl Session {
    fn run(&mut self) {
        loop {
            if let Step::Finished = self.service_outbound() {
                return;
            }
            if let Some(since) = self.closing_since
                && since.elapsed() >= self.close_timeout
            {
                return;
            }
            if let Step::Finished = self.read_once() {
                return;
            }
        }
    }

    fn service_outbound(&mut self) -> Step {
        if self.closing_since.is_some() {
            return Step::Continue;
        }
        loop {
            let (next, close_requested) = {
                let mut outbox = self.outbox.lock();
                (outbox.frames.pop_front(), outbox.close_requested)
            };
            match next {
                Some(payload) => {
                    if let Err(err) = self.socket.send(to_message(payload.clone())) {
                        if is_timeout(&err) {
                            continue;
                        }
                        return self.fail(err, Some(payload));
                    }
                }
                None if close_requested => {
                    self.begin_close();
                    if self.closing_since.is_none() {
                        return Step::Finished;
                    }
                    return Step::Continue;
                }
                None => return Step::Continue,
            }
        }
    }

    fn begin_close(&mut self) {
        if self.closing_since.is_some() {
            return;
        }
        match self.socket.close(None) {
            Ok(()) => self.closing_since = Some(Instant::now()),
            Err(err) if is_timeout(&err) => self.closing_since = Some(Instant::now()),
            Err(_) => {}
        }
    }

    fn read_once(&mut self) -> Step {
        match self.socket.read() {
            Ok(Message::Text(text)) => self.deliver(Payload::Text(text)),
            Ok(Message::Binary(bytes)) => self.deliver(Payload::Binary(bytes)),
            Ok(Message::Close(frame)) => {
                self.close_frame = frame.map(CloseFrame::into_owned);
                Step::Continue
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => Step::Continue,
            Err(err) if is_timeout(&err) => Step::Continue,
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                self.finish_closed();
                Step::Finished
            }
            Err(err) => self.fail(err, None),
        }
    }

    fn deliver(&mut self, payload: Payload) -> Step {
        if self.closing_since.is_some() {
            return Step::Continue;
        }
        if self.sink.message(self.mode.apply(payload)) {
            Step::Continue
        } else {
            self.begin_close();
            Step::Finished
        }
    }

    fn finish_closed(&mut self) {
        if self.closing_since.is_some() {
            return;
        }
        self.reclaim(None);
        let (code, reason) = match self.close_frame.take() {
            Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
            None => (Some(u16::from(CloseCode::Abnormal)), String::new()),
        };
        self.sink.closed(code, reason);
    }

    fn fail(&mut self, err: tungstenite::Error, failed: Option<Payload>) -> Step {
        if self.closing_since.is_none() {
            warn!("websocket transport error: {err}");
            self.reclaim(failed);
            self.sink.error(TransportError::Protocol(err.to_string()));
        }
        Step::Finished
    }

    /// Return the frame whose write failed and everything queued behind it.
    fn reclaim(&mut self, failed: Option<Payload>) {
        let unsent: Vec<Payload> = failed
            .into_iter()
            .chain(self.outbox.lock().seal())
            .collect();
        if !unsent.is_empty() {
            self.sink.unsent(unsent);
        }
    }
}

fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text),
        Payload::Binary(bytes) => Message::Binary(bytes),
    }
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(io_err)
            if matches!(io_err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    )
}

fn establish(target: &OpenTarget) -> Result<Socket, TransportError> {
    let stream = connect_tcp(&target.address, target.connect_timeout)?;
    let control = stream.try_clone()?;
    control.set_read_timeout(Some(target.connect_timeout))?;
    control.set_write_timeout(Some(target.connect_timeout))?;

    let connector = match target.address.scheme() {
        "wss" => Some(Connector::NativeTls(tls_connector(&target.tls)?)),
        _ => Some(Connector::Plain),
    };
    let (socket, _response) =
        tungstenite::client_tls_with_config(target.address.as_str(), stream, None, connector)
            .map_err(|err| match err {
                HandshakeError::Failure(err) => TransportError::Handshake(err.to_string()),
                HandshakeError::Interrupted(_) => {
                    TransportError::Handshake("handshake timed out".into())
                }
            })?;

    control.set_read_timeout(Some(READ_POLL_INTERVAL))?;
    Ok(socket)
}

fn tls_connector(options: &TlsOptions) -> Result<TlsConnector, TransportError> {
    let mut builder = TlsConnector::builder();
    if options.insecure_skip_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    builder
        .build()
        .map_err(|err| TransportError::Tls(err.to_string()))
}

fn socket_addrs(address: &Url) -> io::Result<Vec<SocketAddr>> {
    let host = address
        .host_str()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address has no host"))?;
    let port = address
        .port_or_known_default()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "address has no port"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    (host, port).to_socket_addrs().map(|iter| iter.collect())
}

fn connect_tcp(address: &Url, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in socket_addrs(address)? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses resolved for {address}"),
        )
    }))
}
