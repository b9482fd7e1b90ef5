//! Lifecycle notifications delivered to the embedding application.
//!
//! Every listener method runs on the connection's worker thread, one at a
//! time, exactly once per event. Failures are reported here and never
//! returned from [`Connection`](super::Connection) methods.

use thiserror::Error;

use super::{payload::Payload, transport::TransportError};

/// Failures surfaced through [`ConnectionListener::on_error`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The transport could not be opened.
    #[error("failed to establish connection to {address}: {source}")]
    Establishment {
        address: String,
        #[source]
        source: TransportError,
    },
    /// The transport failed while the connection was open.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),
}

/// Why the connection closed, as reported to [`ConnectionListener::on_close`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The connection closed without the application asking for it.
    Abnormal { code: Option<u16>, reason: String },
    /// The application called `stop` or `destroy`.
    Operator,
}

/// Observer for connection lifecycle events. All methods default to no-ops.
pub trait ConnectionListener: Send + 'static {
    fn on_open(&mut self) {}

    fn on_message(&mut self, _payload: Payload) {}

    fn on_error(&mut self, _error: &ConnectionError) {}

    fn on_close(&mut self, _reason: &CloseReason) {}
}

/// Listener that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ConnectionListener for NoopListener {}

type OpenFn = Box<dyn FnMut() + Send>;
type MessageFn = Box<dyn FnMut(Payload) + Send>;
type ErrorFn = Box<dyn FnMut(&ConnectionError) + Send>;
type CloseFn = Box<dyn FnMut(&CloseReason) + Send>;

/// Closure-based listener with four optional slots.
///
/// ```
/// use tyme_link::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_open(|| println!("connected"))
///     .on_message(|payload| println!("received {payload:?}"));
/// # drop(callbacks);
/// ```
#[derive(Default)]
pub struct Callbacks {
    open: Option<OpenFn>,
    message: Option<MessageFn>,
    error: Option<ErrorFn>,
    close: Option<CloseFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_open(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.open = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl FnMut(Payload) + Send + 'static) -> Self {
        self.message = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&ConnectionError) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl FnMut(&CloseReason) + Send + 'static) -> Self {
        self.close = Some(Box::new(f));
        self
    }
}

impl ConnectionListener for Callbacks {
    fn on_open(&mut self) {
        if let Some(f) = self.open.as_mut() {
            f();
        }
    }

    fn on_message(&mut self, payload: Payload) {
        if let Some(f) = self.message.as_mut() {
            f(payload);
        }
    }

    fn on_error(&mut self, error: &ConnectionError) {
        if let Some(f) = self.error.as_mut() {
            f(error);
        }
    }

    fn on_close(&mut self, reason: &CloseReason) {
        if let Some(f) = self.close.as_mut() {
            f(reason);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("open", &self.open.is_some())
            .field("message", &self.message.is_some())
            .field("error", &self.error.is_some())
            .field("close", &self.close.is_some())
            .finish()
    }
}
