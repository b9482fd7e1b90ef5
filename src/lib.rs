//! Persistent duplex connections with automatic reconnection.
//!
//! [`Connection`] keeps a WebSocket session to a server alive: it reconnects
//! after failures, sends an optional heartbeat, and buffers outbound
//! messages while the link is down. Construction goes through
//! [`ConnectionBuilder`] or an INI file ([`file_config`]); the
//! [`session`] module signs in to the console that serves the socket and
//! yields its address.
//!
//! ```no_run
//! use tyme_link::{Callbacks, ConnectionBuilder};
//!
//! let connection = ConnectionBuilder::new("ws://127.0.0.1:8080/c/ws")
//!     .with_heartbeat(true)
//!     .build_with_listener(Callbacks::new().on_message(|payload| {
//!         println!("received {payload:?}");
//!     }))?;
//! connection.send("hello");
//! connection.destroy();
//! # Ok::<(), tyme_link::BuildError>(())
//! ```

pub mod connection;
pub mod file_config;
pub mod rate_limited_warner;
pub mod session;

pub use connection::{
    BackoffPolicy, BuildError, Callbacks, CloseReason, Connection, ConnectionBuilder,
    ConnectionError, ConnectionListener, ConnectionState, Endpoint, FrameMode, NoopListener,
    Payload, Transport, TransportError, WebSocketTransport,
};
pub use file_config::{FileConfigError, builder_from_ini_str, load_connection_config};
pub use rate_limited_warner::RateLimitedWarner;
pub use session::{SessionClient, SessionError, SessionInfo};
