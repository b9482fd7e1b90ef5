//! Persistent duplex connection manager.
//!
//! A [`Connection`] opens a WebSocket (or any [`Transport`]) to a server and
//! keeps it alive across network interruptions. A dedicated worker thread
//! owns the [`ConnectionCore`] state machine; it reconnects after failures
//! using a pluggable [`BackoffPolicy`], sends a periodic heartbeat while the
//! connection is open, and buffers outbound messages that cannot currently be
//! delivered, flushing them in order once the connection reopens. Lifecycle
//! notifications reach the application through a [`ConnectionListener`].

pub mod backoff;
mod buffer;
mod builder;
mod config;
mod handle;
mod heartbeat;
mod listener;
mod payload;
mod state;
mod transport;
mod websocket;
mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;


pub use backoff::{BackoffPolicy, ExponentialBackoff, FixedDelay};
pub use buffer::OutboundBuffer;
pub use builder::{BuildError, ConnectionBuilder};
pub use config::{
    BackoffKind, ConnectionConfig, DEFAULT_BACKOFF_CAP, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_HEARTBEAT_MESSAGE, DEFAULT_RECONNECT_DELAY, Endpoint, FrameMode, HeartbeatConfig,
    TlsOptions,
};
pub use handle::Connection;
pub use heartbeat::HeartbeatMonitor;
pub use listener::{Callbacks, CloseReason, ConnectionError, ConnectionListener, NoopListener};
pub use payload::Payload;
pub use state::{ConnectionCore, ConnectionState};
pub use transport::{
    EventSink, OpenTarget, TaggedEvent, Transport, TransportError, TransportEvent,
    TransportHandle,
};
pub use websocket::WebSocketTransport;
