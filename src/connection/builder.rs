//! Builder for [`Connection`](super::Connection).
//!
//! Collects the construction contract (address, frame mode, debug flag,
//! heartbeat, reconnection timing) and validates it before the worker
//! thread is spawned. Validation failures are the only errors the
//! connection API ever returns.

use std::{io, time::Duration};

use thiserror::Error;
use url::Url;

use super::{
    backoff::{self, BackoffPolicy},
    config::{
        BackoffKind, ConnectionConfig, DEFAULT_BACKOFF_CAP, FrameMode, HeartbeatConfig,
        TlsOptions,
    },
    handle::Connection,
    listener::{ConnectionListener, NoopListener},
    payload::Payload,
    transport::Transport,
    websocket::WebSocketTransport,
};

/// Errors that may occur while building a connection.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Invalid user supplied configuration.
    #[error("invalid connection configuration: {0}")]
    InvalidConfig(String),
    /// The worker thread could not be spawned.
    #[error(transparent)]
    Io(#[from] io::Error),
}

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value.is_zero() {
            Err(BuildError::InvalidConfig(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok($value)
        }
    }};
}

macro_rules! option_setter {
    ($(#[$meta:meta])* $fn_name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $fn_name(mut self, value: $ty) -> Self {
            self.$field = Some(value);
            self
        }
    };
}

/// Builder for constructing [`Connection`] instances.
#[derive(Clone, Debug, Default)]
pub struct ConnectionBuilder {
    address: Option<String>,
    mode: FrameMode,
    debug: bool,
    heartbeat: bool,
    heartbeat_interval_ms: Option<u64>,
    heartbeat_message: Option<Payload>,
    reconnect: Option<bool>,
    reconnect_delay_ms: Option<u64>,
    backoff_cap_ms: Option<u64>,
    exponential: bool,
    connect_timeout_ms: Option<u64>,
    shutdown_timeout_ms: Option<u64>,
    warn_interval_ms: Option<u64>,
    tls: TlsOptions,
}

impl ConnectionBuilder {
    /// Create a builder targeting `address` (a `ws://` or `wss://` URI).
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_mode(mut self, mode: FrameMode) -> Self {
        self.mode = mode;
        self
    }

    /// Log lifecycle transitions at `info` instead of `debug`.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_heartbeat(mut self, enabled: bool) -> Self {
        self.heartbeat = enabled;
        self
    }

    option_setter!(
        #[doc = "Set the heartbeat interval in milliseconds."]
        with_heartbeat_interval_ms,
        heartbeat_interval_ms,
        u64
    );
    option_setter!(
        #[doc = "Set the delay before each reconnection attempt in milliseconds."]
        with_reconnect_delay_ms,
        reconnect_delay_ms,
        u64
    );
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_shutdown_timeout_ms, shutdown_timeout_ms, u64);
    option_setter!(with_warn_interval_ms, warn_interval_ms, u64);

    /// Replace the default `"ping"` heartbeat payload.
    pub fn with_heartbeat_message(mut self, message: impl Into<Payload>) -> Self {
        self.heartbeat_message = Some(message.into());
        self
    }

    /// Enable or disable automatic reconnection after failures.
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    /// Use exponential backoff with jitter, capped at `cap_ms`.
    pub fn with_exponential_backoff(mut self, cap_ms: u64) -> Self {
        self.exponential = true;
        self.backoff_cap_ms = Some(cap_ms);
        self
    }

    /// Accept invalid TLS certificates (intended for tests).
    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.tls.insecure_skip_verify = insecure;
        self
    }

    /// Validate the builder and produce the immutable configuration.
    pub fn build_config(&self) -> Result<ConnectionConfig, BuildError> {
        let address = self.parse_address()?;
        let mut config = ConnectionConfig::new(address);
        config.mode = self.mode;
        config.debug = self.debug;
        config.reconnect = self.reconnect.unwrap_or(true);
        config.tls = self.tls.clone();

        if self.heartbeat {
            let mut heartbeat = HeartbeatConfig::default();
            if let Some(ms) = self.heartbeat_interval_ms {
                heartbeat.interval =
                    ensure_positive!(Duration::from_millis(ms), "heartbeat_interval_ms")?;
            }
            if let Some(message) = &self.heartbeat_message {
                heartbeat.message = message.clone();
            }
            config.heartbeat = Some(heartbeat);
        }
        if let Some(ms) = self.reconnect_delay_ms {
            config.reconnect_delay =
                ensure_positive!(Duration::from_millis(ms), "reconnect_delay_ms")?;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.connect_timeout =
                ensure_positive!(Duration::from_millis(ms), "connect_timeout_ms")?;
        }
        if let Some(ms) = self.shutdown_timeout_ms {
            config.shutdown_timeout =
                ensure_positive!(Duration::from_millis(ms), "shutdown_timeout_ms")?;
        }
        if let Some(ms) = self.warn_interval_ms {
            config.warn_interval = Duration::from_millis(ms);
        }
        if self.exponential {
            let cap = match self.backoff_cap_ms {
                Some(ms) => ensure_positive!(Duration::from_millis(ms), "backoff_cap_ms")?,
                None => DEFAULT_BACKOFF_CAP,
            };
            if cap < config.reconnect_delay {
                return Err(BuildError::InvalidConfig(
                    "backoff_cap_ms must not be smaller than reconnect_delay_ms".into(),
                ));
            }
            config.backoff = BackoffKind::Exponential { cap };
        }
        Ok(config)
    }

    fn parse_address(&self) -> Result<Url, BuildError> {
        let raw = self
            .address
            .as_deref()
            .ok_or_else(|| BuildError::InvalidConfig("address is required".into()))?;
        let url = Url::parse(raw).map_err(|err| {
            BuildError::InvalidConfig(format!("address {raw:?} is not a valid URI: {err}"))
        })?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(BuildError::InvalidConfig(format!(
                    "address scheme must be ws or wss, got {other}"
                )));
            }
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(BuildError::InvalidConfig(format!(
                "address {raw:?} has no host"
            )));
        }
        Ok(url)
    }

    /// Build a WebSocket connection that ignores lifecycle events.
    pub fn build(&self) -> Result<Connection, BuildError> {
        self.build_with_listener(NoopListener)
    }

    /// Build a WebSocket connection reporting to `listener`.
    pub fn build_with_listener<L: ConnectionListener>(
        &self,
        listener: L,
    ) -> Result<Connection, BuildError> {
        self.build_with_transport(WebSocketTransport::new(), listener)
    }

    /// Build a connection over a custom transport.
    pub fn build_with_transport<T, L>(
        &self,
        transport: T,
        listener: L,
    ) -> Result<Connection, BuildError>
    where
        T: Transport,
        L: ConnectionListener,
    {
        let config = self.build_config()?;
        let policy = backoff::policy_for(&config);
        Ok(Connection::spawn(config, transport, listener, policy)?)
    }

    /// Build a connection over a custom transport and backoff policy.
    pub fn build_with_policy<T, L>(
        &self,
        transport: T,
        listener: L,
        policy: Box<dyn BackoffPolicy>,
    ) -> Result<Connection, BuildError>
    where
        T: Transport,
        L: ConnectionListener,
    {
        let config = self.build_config()?;
        Ok(Connection::spawn(config, transport, listener, policy)?)
    }
}
