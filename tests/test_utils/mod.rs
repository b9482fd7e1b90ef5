//! Helpers shared by the integration tests.
//!
//! Connections run on their own worker thread, so assertions poll shared
//! state until it settles instead of inspecting it once.

#![allow(dead_code)]

use std::{
    thread,
    time::{Duration, Instant},
};

use rstest::fixture;
use tyme_link::{
    Connection, ConnectionBuilder,
    connection::testing::{MockTransport, Recorded, RecordingListener},
};

/// How long [`wait_for`] polls before giving up.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Poll `condition` every few milliseconds until it holds or [`WAIT_LIMIT`]
/// elapses. Returns whether the condition held.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_LIMIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// A connection over [`MockTransport`] with its observers.
pub struct MockConnection {
    pub connection: Connection,
    pub transport: MockTransport,
    pub listener: RecordingListener,
}

impl MockConnection {
    pub fn build(builder: ConnectionBuilder) -> Self {
        let transport = MockTransport::new();
        let listener = RecordingListener::new();
        let connection = builder
            .build_with_transport(transport.clone(), listener.clone())
            .expect("valid connection configuration");
        Self {
            connection,
            transport,
            listener,
        }
    }

    pub fn opens(&self) -> usize {
        self.transport.state().lock().open_count()
    }

    /// Wait for the `n`th transport handle and report it open.
    pub fn open_attempt(&self, n: usize) {
        assert!(
            wait_for(|| self.opens() >= n),
            "attempt {n} was never made"
        );
        let sink = self.transport.state().lock().sinks[n - 1].clone();
        sink.opened();
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.listener.events()
    }

    pub fn wait_for_event(&self, expected: &Recorded) -> bool {
        wait_for(|| self.events().contains(expected))
    }
}

/// Connection with a short reconnect delay so failures recover quickly.
#[fixture]
pub fn mock_connection() -> MockConnection {
    MockConnection::build(
        ConnectionBuilder::new("ws://mock.local/c/ws").with_reconnect_delay_ms(20),
    )
}
