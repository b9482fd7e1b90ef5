//! Configuration structures consumed by the connection lifecycle.
//!
//! [`ConnectionBuilder`](super::ConnectionBuilder) validates and constructs
//! these values before passing them to the worker that owns the state
//! machine. The configuration is immutable once the connection exists.

use std::time::Duration;

use url::Url;

use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

use super::payload::Payload;

/// Default delay before a reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);
/// Default interval between heartbeat pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(60_000);
/// Default payload sent on every heartbeat tick.
pub const DEFAULT_HEARTBEAT_MESSAGE: &str = "ping";
/// Default timeout applied when dialling the server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default cap for the exponential backoff policy.
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);
/// How long `destroy` waits for the worker to acknowledge teardown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// How inbound frames are surfaced to the listener.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameMode {
    /// Deliver frames as received: text as [`Payload::Text`], binary as
    /// [`Payload::Binary`].
    #[default]
    Text,
    /// Deliver every frame as [`Payload::Binary`].
    Binary,
}

impl FrameMode {
    /// Normalise an inbound payload for delivery.
    pub fn apply(self, payload: Payload) -> Payload {
        match self {
            FrameMode::Text => payload,
            FrameMode::Binary => payload.into_binary(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameMode::Text => "text",
            FrameMode::Binary => "binary",
        }
    }
}

/// Heartbeat settings. Present only when the heartbeat is enabled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub message: Payload,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            message: Payload::from(DEFAULT_HEARTBEAT_MESSAGE),
        }
    }
}

/// Reconnection delay policy selected at construction time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackoffKind {
    /// Reuse `reconnect_delay` for every attempt.
    Fixed,
    /// Double `reconnect_delay` per attempt up to `cap`, with jitter.
    Exponential { cap: Duration },
}

/// TLS connection options for `wss://` addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Skip certificate validation when true (intended for tests).
    pub insecure_skip_verify: bool,
}

/// Immutable configuration for one logical connection.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub address: Url,
    pub mode: FrameMode,
    pub debug: bool,
    pub heartbeat: Option<HeartbeatConfig>,
    pub reconnect: bool,
    pub reconnect_delay: Duration,
    pub backoff: BackoffKind,
    pub connect_timeout: Duration,
    pub tls: TlsOptions,
    pub warn_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl ConnectionConfig {
    /// Configuration for `address` with every other option at its default.
    pub fn new(address: Url) -> Self {
        Self {
            address,
            mode: FrameMode::default(),
            debug: false,
            heartbeat: None,
            reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            backoff: BackoffKind::Fixed,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tls: TlsOptions::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Whether the address requires TLS.
    pub fn is_secure(&self) -> bool {
        self.address.scheme() == "wss"
    }
}

/// Address helper used by the session layer.
///
/// The session layer knows the host and whether the console was served over
/// HTTPS; the connection needs a full `ws://` or `wss://` URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub path: String,
    pub secure: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, path: impl Into<String>, secure: bool) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            secure,
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// Render the endpoint as a connection URI.
    pub fn to_url(&self) -> Result<Url, url::ParseError> {
        let path = self.path.trim_start_matches('/');
        Url::parse(&format!("{}://{}/{}", self.scheme(), self.host, path))
    }
}
