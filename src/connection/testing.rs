//! In-memory transport and recording listener for tests.
//!
//! Available to unit tests and, through the `test-util` feature, to
//! integration tests. The transport never touches the network: tests drive
//! it by emitting events through the captured [`EventSink`]s.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    listener::{CloseReason, ConnectionError, ConnectionListener},
    payload::Payload,
    transport::{EventSink, OpenTarget, Transport, TransportError, TransportHandle},
};

/// Shared record of everything a [`MockTransport`] observed.
#[derive(Debug, Default)]
pub struct MockState {
    /// One sink per `open` call, in order.
    pub sinks: Vec<EventSink>,
    /// Payloads written, tagged with the generation of the handle.
    pub sent: Vec<(u64, Payload)>,
    /// Generations whose handle was closed.
    pub closed: Vec<u64>,
    /// Number of upcoming `open` calls that fail synchronously.
    pub fail_opens: usize,
    /// Generations whose handle rejects writes.
    pub broken: Vec<u64>,
}

impl MockState {
    pub fn open_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn last_sink(&self) -> Option<EventSink> {
        self.sinks.last().cloned()
    }

    pub fn sent_payloads(&self) -> Vec<Payload> {
        self.sent.iter().map(|(_, payload)| payload.clone()).collect()
    }
}

/// Transport whose handles record writes into a shared [`MockState`].
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<Mutex<MockState>> {
        Arc::clone(&self.state)
    }
}

impl Transport for MockTransport {
    fn open(
        &mut self,
        _target: &OpenTarget,
        sink: EventSink,
    ) -> Result<Box<dyn TransportHandle>, TransportError> {
        let mut state = self.state.lock();
        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(TransportError::Handshake("connection refused".into()));
        }
        let generation = sink.generation();
        state.sinks.push(sink);
        Ok(Box::new(MockHandle {
            generation,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockHandle {
    generation: u64,
    state: Arc<Mutex<MockState>>,
}

impl TransportHandle for MockHandle {
    fn send(&mut self, payload: Payload) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.broken.contains(&self.generation) {
            return Err(TransportError::Closed);
        }
        state.sent.push((self.generation, payload));
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().closed.push(self.generation);
    }
}

/// A listener notification captured by [`RecordingListener`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recorded {
    Open,
    Message(Payload),
    EstablishmentFailure,
    TransportError,
    Close(CloseReason),
}

/// Listener that appends every notification to a shared log.
#[derive(Clone, Debug, Default)]
pub struct RecordingListener {
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Arc<Mutex<Vec<Recorded>>> {
        Arc::clone(&self.log)
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.log.lock().clone()
    }
}

impl ConnectionListener for RecordingListener {
    fn on_open(&mut self) {
        self.log.lock().push(Recorded::Open);
    }

    fn on_message(&mut self, payload: Payload) {
        self.log.lock().push(Recorded::Message(payload));
    }

    fn on_error(&mut self, error: &ConnectionError) {
        let recorded = match error {
            ConnectionError::Establishment { .. } => Recorded::EstablishmentFailure,
            ConnectionError::Transport(_) => Recorded::TransportError,
        };
        self.log.lock().push(recorded);
    }

    fn on_close(&mut self, reason: &CloseReason) {
        self.log.lock().push(Recorded::Close(reason.clone()));
    }
}
